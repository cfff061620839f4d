// Mortgage Calculator - REST API with Axum
// Handlers, error mapping and the OpenAPI document

use crate::config::AppConfig;
use crate::db::{self, Event, OfferFilter};
use crate::entities::{Bank, Offer, OfferFields, OfferPatch};
use crate::error::{CalcError, Result};
use crate::query::{self, ListParams};
use crate::quote::QuoteError;
use crate::schema::validate_offer;
use anyhow::anyhow;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{delete, get},
    Router,
};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(conn: Connection, config: AppConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| CalcError::Internal(anyhow!("Database lock poisoned")))
    }
}

// ============================================================================
// Error responses
// ============================================================================

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Error payload: `detail` always, `errors` for validation failures
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub detail: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl ErrorBody {
    fn detail(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            errors: Vec::new(),
        }
    }
}

impl IntoResponse for CalcError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            CalcError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    detail: self.to_string(),
                    errors: errors
                        .iter()
                        .map(|e| FieldError {
                            field: e.field.clone(),
                            message: e.message.clone(),
                        })
                        .collect(),
                },
            ),
            CalcError::InvalidRequest(_) | CalcError::Quote(QuoteError::InvalidRequest(_)) => {
                (StatusCode::BAD_REQUEST, ErrorBody::detail(self.to_string()))
            }
            CalcError::Quote(QuoteError::DegenerateRange { .. }) => {
                tracing::warn!(error = %self, "Offer cannot be quoted");
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorBody::detail(self.to_string()))
            }
            CalcError::NotFound(message) => (StatusCode::NOT_FOUND, ErrorBody::detail(message.clone())),
            CalcError::Config(_) | CalcError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::detail("Internal server error"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

// Malformed bodies and query strings get the same payload as validation errors

impl From<JsonRejection> for CalcError {
    fn from(rejection: JsonRejection) -> Self {
        CalcError::invalid_field("body", rejection.body_text(), "Request")
    }
}

impl From<QueryRejection> for CalcError {
    fn from(rejection: QueryRejection) -> Self {
        CalcError::invalid_field("query", rejection.body_text(), "Request")
    }
}

type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;
type QueryParams<T> = std::result::Result<Query<T>, QueryRejection>;

fn offer_not_found(id: i64) -> CalcError {
    CalcError::NotFound(format!("Offer {} not found", id))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "version": crate::VERSION }))
}

/// GET /api/offer - List offers, quoted when price and term are given
#[utoipa::path(
    get,
    path = "/api/offer",
    tag = "offers",
    params(ListParams),
    responses(
        (status = 200, description = "Offers, with `payment` (and `rate` when ordering by rate) if quoted", body = [Offer]),
        (status = 400, description = "Invalid or malformed query parameters", body = ErrorBody),
        (status = 404, description = "No offers found", body = ErrorBody)
    )
)]
async fn list_offers(
    State(state): State<AppState>,
    params: QueryParams<ListParams>,
) -> Result<Response> {
    let Query(params) = params?;
    let offer_query = params.into_query(state.config.api.page_size)?;
    let filter = OfferFilter {
        price: offer_query.quote.map(|q| q.price),
        term: offer_query.quote.map(|q| q.term),
    };

    let offers = {
        let conn = state.conn()?;
        db::query_offers(&conn, &filter)?
    };
    tracing::debug!(candidates = offers.len(), ?filter, "Loaded offers");

    let records = query::run(offers, &offer_query)?;

    let response = match &offer_query.page {
        Some(page) => Json(query::paginate(records, page)?).into_response(),
        None => Json(records).into_response(),
    };
    Ok(response)
}

/// POST /api/offer - Create an offer; the bank is created on first use
#[utoipa::path(
    post,
    path = "/api/offer",
    tag = "offers",
    request_body = OfferFields,
    responses(
        (status = 201, description = "Offer created", body = Offer),
        (status = 400, description = "Validation failed or malformed body", body = ErrorBody)
    )
)]
async fn create_offer(
    State(state): State<AppState>,
    fields: JsonBody<OfferFields>,
) -> Result<(StatusCode, Json<Offer>)> {
    let Json(fields) = fields?;
    validate_offer(&fields)?;

    let offer = {
        let conn = state.conn()?;
        db::create_offer(&conn, &fields)?
    };
    tracing::info!(offer_id = offer.id, bank = %offer.bank_name, "Offer created");

    Ok((StatusCode::CREATED, Json(offer)))
}

/// GET /api/offer/:id
#[utoipa::path(
    get,
    path = "/api/offer/{id}",
    tag = "offers",
    params(("id" = i64, Path, description = "Offer id")),
    responses(
        (status = 200, description = "The offer", body = Offer),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
async fn get_offer(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Offer>> {
    let conn = state.conn()?;
    let offer = db::get_offer(&conn, id)?.ok_or_else(|| offer_not_found(id))?;
    Ok(Json(offer))
}

/// PUT /api/offer/:id - Replace every field
#[utoipa::path(
    put,
    path = "/api/offer/{id}",
    tag = "offers",
    params(("id" = i64, Path, description = "Offer id")),
    request_body = OfferFields,
    responses(
        (status = 200, description = "The offer", body = Offer),
        (status = 400, description = "Validation failed or malformed body", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
async fn update_offer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    fields: JsonBody<OfferFields>,
) -> Result<Json<Offer>> {
    let Json(fields) = fields?;
    validate_offer(&fields)?;

    let conn = state.conn()?;
    let offer = db::update_offer(&conn, id, &fields)?.ok_or_else(|| offer_not_found(id))?;
    tracing::info!(offer_id = id, "Offer updated");

    Ok(Json(offer))
}

/// PATCH /api/offer/:id - Update the given fields only
#[utoipa::path(
    patch,
    path = "/api/offer/{id}",
    tag = "offers",
    params(("id" = i64, Path, description = "Offer id")),
    request_body = OfferPatch,
    responses(
        (status = 200, description = "The offer", body = Offer),
        (status = 400, description = "Validation failed or malformed body", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
async fn patch_offer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    patch: JsonBody<OfferPatch>,
) -> Result<Json<Offer>> {
    let Json(patch) = patch?;
    let conn = state.conn()?;
    let current = db::get_offer(&conn, id)?.ok_or_else(|| offer_not_found(id))?;

    // The merged record must satisfy the same rules as a full write
    let fields = current.fields().patched(patch);
    validate_offer(&fields)?;

    let offer = db::update_offer(&conn, id, &fields)?.ok_or_else(|| offer_not_found(id))?;
    tracing::info!(offer_id = id, "Offer patched");

    Ok(Json(offer))
}

/// DELETE /api/offer/:id
#[utoipa::path(
    delete,
    path = "/api/offer/{id}",
    tag = "offers",
    params(("id" = i64, Path, description = "Offer id")),
    responses(
        (status = 204, description = "Offer deleted"),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
async fn delete_offer(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode> {
    let conn = state.conn()?;
    if !db::delete_offer(&conn, id)? {
        return Err(offer_not_found(id));
    }
    tracing::info!(offer_id = id, "Offer deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/offer/:id/events - Audit trail of one offer
async fn offer_events(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Vec<Event>>> {
    let conn = state.conn()?;
    let events = db::get_events_for_entity(&conn, "offer", &id.to_string())?;
    if events.is_empty() {
        return Err(offer_not_found(id));
    }
    Ok(Json(events))
}

/// GET /api/bank - All banks
#[utoipa::path(
    get,
    path = "/api/bank",
    tag = "banks",
    responses((status = 200, description = "All banks", body = [Bank]))
)]
async fn list_banks(State(state): State<AppState>) -> Result<Json<Vec<Bank>>> {
    let conn = state.conn()?;
    Ok(Json(db::list_banks(&conn)?))
}

/// DELETE /api/bank/:id - Delete a bank together with its offers
#[utoipa::path(
    delete,
    path = "/api/bank/{id}",
    tag = "banks",
    params(("id" = i64, Path, description = "Bank id")),
    responses(
        (status = 204, description = "Bank and its offers deleted"),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
async fn delete_bank(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode> {
    let conn = state.conn()?;
    if !db::delete_bank(&conn, id)? {
        return Err(CalcError::NotFound(format!("Bank {} not found", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        list_offers,
        create_offer,
        get_offer,
        update_offer,
        patch_offer,
        delete_offer,
        list_banks,
        delete_bank
    ),
    components(schemas(Offer, OfferFields, OfferPatch, Bank, ErrorBody, FieldError)),
    tags(
        (name = "offers", description = "Mortgage offers and quotes"),
        (name = "banks", description = "Banks publishing offers")
    )
)]
pub struct ApiDoc;

/// GET /api/schema/ - OpenAPI document
async fn openapi_schema() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

/// GET / - Serve the quote form
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/offer", get(list_offers).post(create_offer))
        .route("/offer/", get(list_offers).post(create_offer))
        .route(
            "/offer/:id",
            get(get_offer)
                .put(update_offer)
                .patch(patch_offer)
                .delete(delete_offer),
        )
        .route("/offer/:id/events", get(offer_events))
        .route("/bank", get(list_banks))
        .route("/bank/:id", delete(delete_bank))
        .route("/schema", get(openapi_schema))
        .route("/schema/", get(openapi_schema))
        .with_state(state);

    Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
