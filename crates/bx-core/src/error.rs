//! Error taxonomy for the Bitrix sync engine.

/// Errors raised while talking to the Bitrix24 REST-over-webhook API.
///
/// Every variant carries a human-readable message; structured context is
/// attached where the caller needs it to decide how to react (retry,
/// narrow a filter, surface to an operator).
#[derive(Debug, thiserror::Error)]
pub enum BitrixError {
    /// `expired_token` / `invalid_token`. Fatal, never retried.
    #[error("bitrix authentication failed: {message}")]
    Authentication { message: String },

    /// `QUERY_LIMIT_EXCEEDED`. Retried transparently by the client up to
    /// five times with capped exponential backoff.
    #[error("bitrix rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<u64>,
    },

    /// `OPERATION_TIME_LIMIT`. Fatal for the call; the caller should
    /// narrow its filter and retry on the next scheduled run.
    #[error("bitrix operation time limit: {message}")]
    OperationTimeLimit { message: String },

    /// Any other `error` member in a Bitrix response.
    #[error("bitrix api error: {message}")]
    ApiError {
        message: String,
        code: Option<String>,
    },

    /// Transport-level failure (connection, timeout, malformed response).
    #[error("bitrix transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl BitrixError {
    /// True if the Bitrix Client's retry loop should reattempt this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BitrixError::RateLimited { .. })
    }
}

/// Errors surfaced by the warehouse access layer and the upsert writer.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("schema introspection failed for table {table}: {message}")]
    Schema { table: String, message: String },

    #[error("unsupported dialect: {0}")]
    UnsupportedDialect(String),
}

/// Errors raised by the entity and reference sync services.
///
/// Wraps lower-level [`BitrixError`] / [`DatabaseError`] with entity
/// context before the service writes a failed `sync_logs` row.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("bitrix error during {entity_type} sync: {source}")]
    Bitrix {
        entity_type: String,
        #[source]
        source: BitrixError,
    },

    #[error("database error during {entity_type} sync: {source}")]
    Database {
        entity_type: String,
        #[source]
        source: DatabaseError,
    },

    #[error("sync configuration error: {message}")]
    Config { message: String },

    #[error("{entity_type} sync failed: {message}")]
    Other { entity_type: String, message: String },
}

impl SyncError {
    pub fn bitrix(entity_type: impl Into<String>, source: BitrixError) -> Self {
        SyncError::Bitrix {
            entity_type: entity_type.into(),
            source,
        }
    }

    pub fn database(entity_type: impl Into<String>, source: DatabaseError) -> Self {
        SyncError::Database {
            entity_type: entity_type.into(),
            source,
        }
    }

    /// The entity type this error occurred against, for log/tracing context.
    pub fn entity_type(&self) -> &str {
        match self {
            SyncError::Bitrix { entity_type, .. } => entity_type,
            SyncError::Database { entity_type, .. } => entity_type,
            SyncError::Config { .. } => "",
            SyncError::Other { entity_type, .. } => entity_type,
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_is_retryable() {
        let err = BitrixError::RateLimited {
            message: "too many requests".into(),
            retry_after: Some(5),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn authentication_is_not_retryable() {
        let err = BitrixError::Authentication {
            message: "expired_token".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn sync_error_carries_entity_context() {
        let bitrix_err = BitrixError::ApiError {
            message: "boom".into(),
            code: Some("SOME_CODE".into()),
        };
        let err = SyncError::bitrix("deal", bitrix_err);
        assert_eq!(err.entity_type(), "deal");
        assert!(err.to_string().contains("deal"));
    }
}
