use thiserror::Error;

/// Error taxonomy for the gateway. Every subsystem error maps onto exactly
/// one of these kinds; handlers translate the kind (not the message) into
/// an HTTP status and a stable `error` code from the error catalog.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("session not ready: {0}")]
    NotReady(String),

    #[error("qr code not available: {0}")]
    QrFailed(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("upstream webhook error: {0}")]
    Upstream(String),

    #[error("persistence: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("internal: {0}")]
    Internal(String),

    #[error("invalid json body: {0}")]
    InvalidJson(String),

    #[error("missing session id")]
    MissingSessionId,
}

/// Repository-layer errors. Kept distinct from [`GatewayError`] so
/// repository code never has to know about HTTP status codes; handlers do
/// the kind -> status translation.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("row not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl GatewayError {
    /// The stable error code from the standard error codes table.
    /// Handlers attach this to the JSON error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "VALIDATION_ERROR",
            GatewayError::NotFound(_) => "SESSION_NOT_FOUND",
            GatewayError::Conflict(_) => "CREATE_FAILED",
            GatewayError::Unauthorized(_) => "INVALID_API_KEY",
            GatewayError::Forbidden(_) => "ACCESS_DENIED",
            GatewayError::NotReady(_) => "SESSION_NOT_READY",
            GatewayError::QrFailed(_) => "QR_FAILED",
            GatewayError::Transport(_) => "CONNECT_FAILED",
            GatewayError::Upstream(_) => "WEBHOOK_SAVE_FAILED",
            GatewayError::Persistence(PersistenceError::Conflict(_)) => "CREATE_FAILED",
            GatewayError::Persistence(PersistenceError::NotFound(_)) => "SESSION_NOT_FOUND",
            GatewayError::Persistence(PersistenceError::Database(_)) => "INTERNAL_ERROR",
            GatewayError::Protocol(_) => "CONNECT_FAILED",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
            GatewayError::InvalidJson(_) => "INVALID_JSON",
            GatewayError::MissingSessionId => "MISSING_SESSION_ID",
        }
    }

    /// The HTTP status a handler should answer with. Test suites pin the
    /// `code()`, not necessarily this status.
    pub fn status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode as S;
        match self {
            GatewayError::Validation(_) => S::BAD_REQUEST,
            GatewayError::NotFound(_) => S::NOT_FOUND,
            GatewayError::Conflict(_) => S::CONFLICT,
            GatewayError::Unauthorized(_) => S::UNAUTHORIZED,
            GatewayError::Forbidden(_) => S::FORBIDDEN,
            GatewayError::NotReady(_) => S::CONFLICT,
            GatewayError::QrFailed(_) => S::REQUEST_TIMEOUT,
            GatewayError::Transport(_) => S::BAD_GATEWAY,
            GatewayError::Upstream(_) => S::BAD_GATEWAY,
            GatewayError::Persistence(PersistenceError::Conflict(_)) => S::CONFLICT,
            GatewayError::Persistence(PersistenceError::NotFound(_)) => S::NOT_FOUND,
            GatewayError::Persistence(PersistenceError::Database(_)) => S::INTERNAL_SERVER_ERROR,
            GatewayError::Protocol(_) => S::BAD_GATEWAY,
            GatewayError::Internal(_) => S::INTERNAL_SERVER_ERROR,
            GatewayError::InvalidJson(_) => S::BAD_REQUEST,
            GatewayError::MissingSessionId => S::BAD_REQUEST,
        }
    }
}

/// Wire shape for the JSON error envelope every handler answers with.
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    pub status: u16,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        tracing::warn!(code = self.code(), %status, error = %self, "request failed");
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
            timestamp: chrono::Utc::now(),
        };
        (status, axum::Json(body)).into_response()
    }
}

/// Maps a raw [`sqlx::Error`] onto [`PersistenceError`], distinguishing
/// uniqueness violations from generic failures.
pub fn classify_sqlx_error(err: sqlx::Error) -> PersistenceError {
    match &err {
        sqlx::Error::RowNotFound => PersistenceError::NotFound("row not found".into()),
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            if message.contains("UNIQUE constraint failed") || db_err.is_unique_violation() {
                PersistenceError::Conflict(message.to_string())
            } else {
                PersistenceError::Database(err)
            }
        }
        _ => PersistenceError::Database(err),
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_create_failed_code() {
        let err = GatewayError::Conflict("name taken".into());
        assert_eq!(err.code(), "CREATE_FAILED");
    }

    #[test]
    fn forbidden_maps_to_access_denied() {
        let err = GatewayError::Forbidden("wrong session".into());
        assert_eq!(err.code(), "ACCESS_DENIED");
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn persistence_conflict_propagates_kind() {
        let err: GatewayError = PersistenceError::Conflict("dup".into()).into();
        assert_eq!(err.code(), "CREATE_FAILED");
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
    }
}
