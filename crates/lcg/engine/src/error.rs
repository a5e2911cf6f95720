use lcg_policy::PolicyError;
use lcg_store::StoreError;
use lcg_validator::ValidationError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Caller-facing error taxonomy.
///
/// Every failure is caused by caller state, not transient infrastructure;
/// nothing here is retried. The single transient case is store lock
/// contention, surfaced as `Busy` after the store's bounded wait.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store busy, retry later")]
    Busy,

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// HTTP-style result code for host layers.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::Validation(_) => 400,
            EngineError::Forbidden(_) => 403,
            EngineError::NotFound(_) => 404,
            EngineError::Conflict(_) => 409,
            EngineError::Busy => 503,
            EngineError::Internal(_) => 500,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => EngineError::NotFound(msg),
            StoreError::Conflict(msg) => EngineError::Conflict(msg),
            StoreError::InvariantViolation(msg) => EngineError::Conflict(msg),
            StoreError::InvalidInput(msg) => EngineError::Validation(msg),
            StoreError::Busy => EngineError::Busy,
            StoreError::Serialization(msg) | StoreError::Backend(msg) => {
                EngineError::Internal(msg)
            }
        }
    }
}

impl From<PolicyError> for EngineError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Store(store) => store.into(),
            denial => EngineError::Forbidden(denial.to_string()),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_result_contract() {
        assert_eq!(EngineError::Validation("x".into()).status_code(), 400);
        assert_eq!(EngineError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(EngineError::NotFound("x".into()).status_code(), 404);
        assert_eq!(EngineError::Conflict("x".into()).status_code(), 409);
        assert_eq!(EngineError::Busy.status_code(), 503);
    }
}
