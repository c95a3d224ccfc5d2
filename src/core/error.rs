//! Typed error handling for the document engine
//!
//! The engine itself fails at configuration time, or when a request asks for
//! something the configured operations cannot serve. Everything else that
//! reaches a caller is either a recovered condition (not-found, access
//! denied) folded into the document, or a failure raised by a caller-supplied
//! function and propagated unmodified.
//!
//! # Error Categories
//!
//! - [`ConfigError`]: pipeline or registry construction problems, raised
//!   before any data is fetched
//! - [`EngineError::NotFound`]: returned by suppliers/resolvers and recovered
//!   locally by the pipelines
//! - [`EngineError::Resolver`]: any other supplier/resolver failure
//! - [`EngineError::UnsupportedRequest`]: a well-formed request the
//!   configured operations cannot answer, rejected before any fetch
//!
//! # Example
//!
//! ```rust,ignore
//! use jsonapi_engine::prelude::*;
//!
//! let supplier = |req: Arc<Request>| async move {
//!     let id = req.resource_id().unwrap_or_default().to_string();
//!     storage.get(&id).await?.ok_or(EngineError::not_found("users", id))
//! };
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Convenience alias used by every caller-supplied function
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// The main error type of the engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid configuration detected while building a pipeline or registry
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The requested item (or relationship target) does not exist
    #[error("{resource_type} with id '{id}' not found")]
    NotFound { resource_type: String, id: String },

    /// A caller-supplied supplier or resolver failed
    #[error("resolver failed: {0}")]
    Resolver(#[source] anyhow::Error),

    /// A scheduled task was dropped before it reported a result
    #[error("task '{task}' was aborted before completion")]
    TaskAborted { task: String },

    /// The request cannot be served by the operations registered for the type
    #[error("unsupported request for '{resource_type}': {reason}")]
    UnsupportedRequest {
        resource_type: String,
        reason: String,
    },
}

impl EngineError {
    /// Build a not-found condition
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Build an unsupported-request error
    pub fn unsupported(resource_type: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::UnsupportedRequest {
            resource_type: resource_type.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a recoverable not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::Resolver(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::TaskAborted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::UnsupportedRequest { .. } => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::Config(e) => e.error_code(),
            EngineError::NotFound { .. } => "RESOURCE_NOT_FOUND",
            EngineError::Resolver(_) => "RESOLVER_FAILED",
            EngineError::TaskAborted { .. } => "TASK_ABORTED",
            EngineError::UnsupportedRequest { .. } => "UNSUPPORTED_REQUEST",
        }
    }

    /// Convert to a JSON:API error object
    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject {
            status: self.status_code().as_u16().to_string(),
            code: self.error_code().to_string(),
            detail: self.to_string(),
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Resolver(err)
    }
}

/// A single entry of a JSON:API `errors` array
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorObject {
    pub status: String,
    pub code: String,
    pub detail: String,
}

/// Top-level error document
#[derive(Debug, Serialize)]
pub struct ErrorDocument {
    pub errors: Vec<ErrorObject>,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorDocument {
            errors: vec![self.to_error_object()],
        });
        (status, body).into_response()
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A relationship was declared as default but no resolver was bound to it
    #[error("relationship '{relationship}' of '{resource_type}' is declared but has no resolver")]
    MissingResolver {
        resource_type: String,
        relationship: String,
    },

    /// A resolver was bound to a relationship that was never declared
    #[error("relationship '{relationship}' of '{resource_type}' has a resolver but is not declared")]
    UndeclaredRelationship {
        resource_type: String,
        relationship: String,
    },

    /// Same key registered twice
    #[error("duplicate {kind} registration for '{key}'")]
    Duplicate { kind: String, key: String },

    /// A required builder argument was never provided
    #[error("missing required argument '{argument}' for '{context}'")]
    MissingArgument { argument: String, context: String },

    /// Resource type is not registered
    #[error("unknown resource type: {resource_type}")]
    UnknownResourceType { resource_type: String },

    /// A registration exists but was made for other request/item types
    #[error("'{key}' is registered with different request or item types")]
    TypeMismatch { key: String },

    /// Failed to parse a configuration source
    #[error("failed to parse config{}: {message}", file_suffix(.file))]
    ParseError {
        file: Option<String>,
        message: String,
    },
}

fn file_suffix(file: &Option<String>) -> String {
    file.as_ref()
        .map(|f| format!(" file '{}'", f))
        .unwrap_or_default()
}

impl ConfigError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::MissingResolver { .. } => "MISSING_RELATIONSHIP_RESOLVER",
            ConfigError::UndeclaredRelationship { .. } => "UNDECLARED_RELATIONSHIP",
            ConfigError::Duplicate { .. } => "DUPLICATE_REGISTRATION",
            ConfigError::MissingArgument { .. } => "MISSING_ARGUMENT",
            ConfigError::UnknownResourceType { .. } => "UNKNOWN_RESOURCE_TYPE",
            ConfigError::TypeMismatch { .. } => "TYPE_MISMATCH",
            ConfigError::ParseError { .. } => "CONFIG_PARSE_ERROR",
        }
    }

    pub(crate) fn duplicate(kind: &str, key: impl Into<String>) -> Self {
        ConfigError::Duplicate {
            kind: kind.to_string(),
            key: key.into(),
        }
    }

    pub(crate) fn missing_argument(argument: &str, context: &str) -> Self {
        ConfigError::MissingArgument {
            argument: argument.to_string(),
            context: context.to_string(),
        }
    }
}
