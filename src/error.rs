//! Single error taxonomy shared by every layer. Each variant maps to exactly
//! one HTTP status at the API surface (see `api::mod::into_response`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// The kind of failure, independent of how it is ultimately surfaced.
///
/// Layers that wrap an error with `.context(...)` must preserve the kind;
/// only the `Internal` kind should ever be produced by an unexpected panic
/// or invariant violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    Forbidden,
    NotFound,
    Conflict,
    DependencyFailed,
    Transient,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict | ErrorKind::DependencyFailed => StatusCode::CONFLICT,
            ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a caller may safely retry the operation after backing off.
    pub fn retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Timeout)
    }
}

/// One field-level validation failure, used to build `ValidationError`s with
/// JSON-pointer-ish paths (`spec.routes[0].host`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// The crate-wide error type. Carries enough context for logging without
/// leaking internals to the HTTP client.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub fields: Vec<FieldError>,
    pub source: Option<anyhow::Error>,
    pub context: Vec<(&'static str, String)>,
    pub retry_after_secs: Option<u64>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fields: Vec::new(),
            source: None,
            context: Vec::new(),
            retry_after_secs: None,
        }
    }

    pub fn from_anyhow(kind: ErrorKind, source: anyhow::Error, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fields: Vec::new(),
            source: Some(source),
            context: Vec::new(),
            retry_after_secs: None,
        }
    }

    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldError>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn fields(fields: Vec<FieldError>) -> Self {
        Self::new(ErrorKind::Validation, "request failed validation").with_fields(fields)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// A dependency cycle at group creation (§4.6 step 2, §7, §8): a
    /// `Conflict`, not a `Validation`, since the input is well-formed and
    /// the conflict is structural (the graph, not any one field).
    pub fn dependency_cycle(edge: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, "dependency cycle detected").with_context("cycle_edge", edge)
            .with_context("reason", "DependencyCycle")
    }

    pub fn dependency_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DependencyFailed, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn internal_anyhow(source: anyhow::Error, message: impl Into<String>) -> Self {
        Self::from_anyhow(ErrorKind::Internal, source, message)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                message = %self.message,
                context = ?self.context,
                error = ?self.source,
                "request failed"
            );
        } else {
            tracing::debug!(
                status = status.as_u16(),
                message = %self.message,
                context = ?self.context,
                "request rejected"
            );
        }

        let mut body = json!({ "error": self.message });
        if !self.fields.is_empty() {
            body["fields"] = json!(self.fields);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert("Retry-After", secs.to_string().parse().unwrap());
        }
        response
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::internal_anyhow(err, "internal error")
    }
}

#[cfg(feature = "server")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::not_found("entity not found"),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::conflict("unique constraint violated")
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                Self::from_anyhow(ErrorKind::Transient, err.into(), "database unavailable")
                    .with_retry_after(1)
            }
            _ => Self::internal_anyhow(err.into(), "database operation failed"),
        }
    }
}

/// Ergonomic conversion for `Result<T, E>` where `E: Into<anyhow::Error>`,
/// mirroring the teacher's `ServerErrorExt` extension trait.
pub trait ErrorExt<T> {
    fn err_kind(self, kind: ErrorKind, message: impl Into<String>) -> Result<T, Error>;
    fn internal_err(self, message: impl Into<String>) -> Result<T, Error>;
}

impl<T, E> ErrorExt<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn err_kind(self, kind: ErrorKind, message: impl Into<String>) -> Result<T, Error> {
        self.map_err(|e| Error::from_anyhow(kind, e.into(), message))
    }

    fn internal_err(self, message: impl Into<String>) -> Result<T, Error> {
        self.map_err(|e| Error::internal_anyhow(e.into(), message))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
