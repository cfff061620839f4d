// Shape Layer - Offer and quote request validation
// Offers are checked on every write; quote parameters on every read.

use crate::entities::{OfferFields, BANK_NAME_MAX_LEN};
use crate::quote::QuoteRequest;

/// Upper bound on any advertised rate, percent
pub const RATE_CAP: f64 = 50.0;

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub context: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>, context: &str) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.into(),
            context: context.to_string(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.context, self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

fn into_result(errors: Vec<ValidationError>) -> ValidationResult {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ============================================================================
// OFFER VALIDATION
// ============================================================================

/// Validate an offer field set before it is written.
///
/// Term and payment ranges must have `min < max`: both are divisors in
/// [`crate::quote::proposed_rate`], so a fixed-term or fixed-amount offer is
/// rejected here rather than failing later at quote time. Equal rates are
/// fine since the rate range is never divided by.
pub fn validate_offer(offer: &OfferFields) -> ValidationResult {
    const CONTEXT: &str = "Offer";
    let mut errors = Vec::new();

    let name = offer.bank_name.trim();
    if name.is_empty() {
        errors.push(ValidationError::new(
            "bank_name",
            "Required field is empty",
            CONTEXT,
        ));
    } else if name.chars().count() > BANK_NAME_MAX_LEN {
        errors.push(ValidationError::new(
            "bank_name",
            format!("Must be at most {} characters", BANK_NAME_MAX_LEN),
            CONTEXT,
        ));
    }

    for (field, value) in [("rate_min", offer.rate_min), ("rate_max", offer.rate_max)] {
        if !value.is_finite() {
            errors.push(ValidationError::new(field, "Must be a finite number", CONTEXT));
        } else if value < 0.0 {
            errors.push(ValidationError::new(
                field,
                format!("Must not be negative, got {}", value),
                CONTEXT,
            ));
        }
    }

    if offer.rate_max > RATE_CAP {
        errors.push(ValidationError::new(
            "rate_max",
            format!("Must not exceed {}, got {}", RATE_CAP, offer.rate_max),
            CONTEXT,
        ));
    }

    if offer.rate_min > offer.rate_max {
        errors.push(ValidationError::new(
            "rate_min",
            format!(
                "rate_min ({}) must not exceed rate_max ({})",
                offer.rate_min, offer.rate_max
            ),
            CONTEXT,
        ));
    }

    if offer.term_min > offer.term_max {
        errors.push(ValidationError::new(
            "term_min",
            format!(
                "term_min ({}) must not exceed term_max ({})",
                offer.term_min, offer.term_max
            ),
            CONTEXT,
        ));
    } else if offer.term_min == offer.term_max {
        errors.push(ValidationError::new(
            "term_max",
            "term_max must be greater than term_min",
            CONTEXT,
        ));
    }

    if offer.payment_min > offer.payment_max {
        errors.push(ValidationError::new(
            "payment_min",
            format!(
                "payment_min ({}) must not exceed payment_max ({})",
                offer.payment_min, offer.payment_max
            ),
            CONTEXT,
        ));
    } else if offer.payment_min == offer.payment_max {
        errors.push(ValidationError::new(
            "payment_max",
            "payment_max must be greater than payment_min",
            CONTEXT,
        ));
    }

    into_result(errors)
}

// ============================================================================
// QUOTE REQUEST VALIDATION
// ============================================================================

/// Validate client quote parameters
pub fn validate_quote_request(request: &QuoteRequest) -> ValidationResult {
    const CONTEXT: &str = "Query";
    let mut errors = Vec::new();

    if request.term == 0 {
        errors.push(ValidationError::new("term", "Must be at least 1 year", CONTEXT));
    }

    if !request.deposit.is_finite() || !(0.0..=100.0).contains(&request.deposit) {
        errors.push(ValidationError::new(
            "deposit",
            format!("Must be a percentage between 0 and 100, got {}", request.deposit),
            CONTEXT,
        ));
    }

    into_result(errors)
}

// ============================================================================
// TESTS
// ============================================================================
