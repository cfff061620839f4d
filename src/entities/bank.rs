// Bank Entity - identified by id, referenced by unique name
//
// Offers refer to their bank by name on the wire; the repository resolves
// the name to a row (or creates one) on write.

use serde::{Deserialize, Serialize};

/// Maximum length of a bank name
pub const BANK_NAME_MAX_LEN: usize = 250;

// ============================================================================
// BANK ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(utoipa::ToSchema))]
pub struct Bank {
    pub id: i64,

    /// Unique, non-empty display name
    pub name: String,
}

impl Bank {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Bank {
            id,
            name: name.into(),
        }
    }
}

// ============================================================================
// GET-OR-CREATE OUTCOME
// ============================================================================

/// Result of resolving a bank by name on write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankLookup {
    /// A bank with this name already existed
    Found(Bank),

    /// No bank had this name; a new row was inserted
    Created(Bank),
}

impl BankLookup {
    pub fn bank(&self) -> &Bank {
        match self {
            BankLookup::Found(bank) | BankLookup::Created(bank) => bank,
        }
    }

    pub fn into_bank(self) -> Bank {
        match self {
            BankLookup::Found(bank) | BankLookup::Created(bank) => bank,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, BankLookup::Created(_))
    }
}
