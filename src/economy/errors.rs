use thiserror::Error;

use crate::economy::types::Money;

/// Errors returned by the economy core.
///
/// Domain-rule violations (everything from `InvalidAmount` to `AccountNotLoaded`) are
/// ordinary results for the caller to report; they are never retried automatically.
/// Storage wrappers and `PersistenceFailure` come from the durability layer and are
/// logged by the persistence worker rather than surfaced to players.
#[derive(Debug, Error)]
pub enum EconomyError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Catalog files and `inspect` output use JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around IO errors (directory creation, catalog files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Zero, negative or unparseable amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Loan principal above the configured ceiling.
    #[error("amount {amount} out of range (max {max})")]
    AmountOutOfRange { amount: Money, max: Money },

    #[error("unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Money, available: Money },

    #[error("loan limit reached ({max} active loans)")]
    LoanLimitExceeded { max: usize },

    #[error("loan not found: {0}")]
    LoanNotFound(String),

    #[error("loan already repaid: {0}")]
    AlreadyRepaid(String),

    #[error("quest already active: {0}")]
    QuestAlreadyActive(String),

    #[error("no active quest")]
    NoActiveQuest,

    #[error("no quests are defined")]
    NoQuestsDefined,

    #[error("quest not found: {0}")]
    QuestNotFound(String),

    #[error("all booths are occupied")]
    AllBoothsOccupied,

    #[error("booth id already registered: {0}")]
    BoothIdConflict(String),

    #[error("booth not found: {0}")]
    BoothNotFound(String),

    /// The account is not connected (no live record in memory).
    #[error("account not loaded: {0}")]
    AccountNotLoaded(String),

    /// Catalog file contents rejected during load or reload.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    /// A durable write could not be completed; in-memory state stays authoritative.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// Internal error (task join errors, unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}
