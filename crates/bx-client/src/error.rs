//! Maps raw Bitrix `error`/`error_description` response members onto the
//! shared [`bx_core::BitrixError`] taxonomy.

use bx_core::BitrixError;

/// Classifies a Bitrix error code string into the typed taxonomy.
///
/// `error_code` is Bitrix's own `error` field value; `description` is
/// `error_description`, used verbatim as the message. Any code containing
/// `OPERATION_TIME_LIMIT` maps to [`BitrixError::OperationTimeLimit`]
/// regardless of where it originated (including transport-level error
/// text), per the client's stated policy.
pub fn classify_error_code(error_code: &str, description: &str) -> BitrixError {
    let upper = error_code.to_uppercase();
    if upper.contains("OPERATION_TIME_LIMIT") {
        return BitrixError::OperationTimeLimit {
            message: description.to_string(),
        };
    }
    if upper.contains("QUERY_LIMIT_EXCEEDED") {
        return BitrixError::RateLimited {
            message: description.to_string(),
            retry_after: None,
        };
    }
    if upper == "EXPIRED_TOKEN" || upper == "INVALID_TOKEN" {
        return BitrixError::Authentication {
            message: description.to_string(),
        };
    }
    BitrixError::ApiError {
        message: description.to_string(),
        code: Some(error_code.to_string()),
    }
}

/// Recognizes an `OPERATION_TIME_LIMIT` signature inside free-form error
/// text (transport exceptions, malformed bodies) and converts it.
pub fn reclassify_if_time_limit(message: &str) -> Option<BitrixError> {
    if message.to_uppercase().contains("OPERATION_TIME_LIMIT") {
        Some(BitrixError::OperationTimeLimit {
            message: message.to_string(),
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_operation_time_limit() {
        let err = classify_error_code("OPERATION_TIME_LIMIT", "too much data");
        assert!(matches!(err, BitrixError::OperationTimeLimit { .. }));
    }

    #[test]
    fn classifies_query_limit_exceeded() {
        let err = classify_error_code("QUERY_LIMIT_EXCEEDED", "slow down");
        assert!(matches!(err, BitrixError::RateLimited { .. }));
    }

    #[test]
    fn classifies_expired_token() {
        let err = classify_error_code("expired_token", "token expired");
        assert!(matches!(err, BitrixError::Authentication { .. }));
    }

    #[test]
    fn classifies_invalid_token() {
        let err = classify_error_code("invalid_token", "bad token");
        assert!(matches!(err, BitrixError::Authentication { .. }));
    }

    #[test]
    fn unknown_code_is_generic_api_error() {
        let err = classify_error_code("SOME_WEIRD_CODE", "huh");
        assert!(matches!(err, BitrixError::ApiError { .. }));
    }

    #[test]
    fn reclassifies_transport_text_mentioning_time_limit() {
        let err = reclassify_if_time_limit("upstream said OPERATION_TIME_LIMIT exceeded");
        assert!(matches!(err, Some(BitrixError::OperationTimeLimit { .. })));
    }
}
