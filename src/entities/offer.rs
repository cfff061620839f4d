// Offer Entity - a bank's advertised rate / term / principal ranges

use serde::{Deserialize, Serialize};

// ============================================================================
// STORED OFFER
// ============================================================================

/// Offer as stored and as represented on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct Offer {
    pub id: i64,

    /// Name of the owning bank
    pub bank_name: String,

    /// Interest rate range, percent per year
    pub rate_min: f64,
    pub rate_max: f64,

    /// Loan term range, years
    pub term_min: u32,
    pub term_max: u32,

    /// Credit amount range, currency units
    pub payment_min: u64,
    pub payment_max: u64,
}

impl Offer {
    /// Does this offer's advertised range contain the requested amount and term?
    pub fn covers(&self, price: u64, term: u32) -> bool {
        (self.payment_min..=self.payment_max).contains(&price)
            && (self.term_min..=self.term_max).contains(&term)
    }

    /// Writable field set of this offer
    pub fn fields(&self) -> OfferFields {
        OfferFields {
            bank_name: self.bank_name.clone(),
            rate_min: self.rate_min,
            rate_max: self.rate_max,
            term_min: self.term_min,
            term_max: self.term_max,
            payment_min: self.payment_min,
            payment_max: self.payment_max,
        }
    }
}

// ============================================================================
// WRITE PAYLOADS
// ============================================================================

/// Full field set accepted on create and full update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct OfferFields {
    pub bank_name: String,
    pub rate_min: f64,
    pub rate_max: f64,
    pub term_min: u32,
    pub term_max: u32,
    pub payment_min: u64,
    pub payment_max: u64,
}

/// Partial update; absent fields keep their stored value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct OfferPatch {
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub rate_min: Option<f64>,
    #[serde(default)]
    pub rate_max: Option<f64>,
    #[serde(default)]
    pub term_min: Option<u32>,
    #[serde(default)]
    pub term_max: Option<u32>,
    #[serde(default)]
    pub payment_min: Option<u64>,
    #[serde(default)]
    pub payment_max: Option<u64>,
}

impl OfferFields {
    /// Apply a partial update on top of these fields
    pub fn patched(self, patch: OfferPatch) -> OfferFields {
        OfferFields {
            bank_name: patch.bank_name.unwrap_or(self.bank_name),
            rate_min: patch.rate_min.unwrap_or(self.rate_min),
            rate_max: patch.rate_max.unwrap_or(self.rate_max),
            term_min: patch.term_min.unwrap_or(self.term_min),
            term_max: patch.term_max.unwrap_or(self.term_max),
            payment_min: patch.payment_min.unwrap_or(self.payment_min),
            payment_max: patch.payment_max.unwrap_or(self.payment_max),
        }
    }
}
