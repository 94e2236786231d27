use crate::types::Money;
use thiserror::Error;

pub type LoyaltyResult<T> = Result<T, LoyaltyError>;

/// Coarse error classes surfaced to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed tier or badge catalog.
    Configuration,
    /// Bad input to a CRUD operation.
    Validation,
    /// Request collides with catalog invariants.
    Conflict,
    AlreadyClaimed,
    NotFound,
    Internal,
}

#[derive(Error, Debug)]
pub enum LoyaltyError {
    #[error("No tier matches the given spend (catalog is empty or lacks a floor tier)")]
    NoMatchingTier,

    #[error("Tier catalog must contain a tier with a minimum spend of zero")]
    MissingFloorTier,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Another tier already uses the minimum spend threshold {min_spend}")]
    ConflictingThreshold { min_spend: Money },

    #[error("Cannot delete the last remaining tier")]
    CannotDeleteLastTier,

    #[error("Cannot delete the floor tier (minimum spend of zero)")]
    CannotDeleteFloorTier,

    #[error("Reward already claimed")]
    AlreadyClaimed,

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Record store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LoyaltyError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        LoyaltyError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            LoyaltyError::NoMatchingTier
            | LoyaltyError::MissingFloorTier
            | LoyaltyError::Configuration(_) => ErrorCategory::Configuration,
            LoyaltyError::Validation(_) => ErrorCategory::Validation,
            LoyaltyError::ConflictingThreshold { .. }
            | LoyaltyError::CannotDeleteLastTier
            | LoyaltyError::CannotDeleteFloorTier => ErrorCategory::Conflict,
            LoyaltyError::AlreadyClaimed => ErrorCategory::AlreadyClaimed,
            LoyaltyError::NotFound { .. } => ErrorCategory::NotFound,
            LoyaltyError::Store(_)
            | LoyaltyError::Serialization(_)
            | LoyaltyError::Io(_)
            | LoyaltyError::Internal(_) => ErrorCategory::Internal,
        }
    }
}
