// Entity Models
//
// Bank 1 — N Offer. Banks are resolved by name when an offer is written.

pub mod bank;
pub mod offer;

pub use bank::{Bank, BankLookup, BANK_NAME_MAX_LEN};
pub use offer::{Offer, OfferFields, OfferPatch};
