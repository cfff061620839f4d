// Mortgage Calculator - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod logging;
pub mod query;
pub mod quote;
pub mod schema;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{
    Event, OfferFilter,
    setup_database, get_or_create_bank, find_bank_by_name, list_banks, delete_bank,
    create_offer, update_offer, get_offer, delete_offer, list_offers, query_offers,
    count_offers, insert_event, get_events_for_entity,
};
pub use entities::{Bank, BankLookup, Offer, OfferFields, OfferPatch};
pub use error::CalcError;
pub use query::{
    find_eligible, annotate, sort, paginate,
    ListParams, OfferQuery, Page, PageRequest, QuotedOffer, SortKey, SortOrder,
};
pub use quote::{monthly_payment, proposed_rate, QuoteError, QuoteRequest};
pub use schema::{validate_offer, validate_quote_request, ValidationError, ValidationResult, RATE_CAP};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
