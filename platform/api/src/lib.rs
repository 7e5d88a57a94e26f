use std::sync::Arc;

use async_graphql::{Error, ErrorExtensions};
use products_crm::CrmError;
use thiserror::Error;
use tracing::error;

/// Shared GraphQL result type.
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error, Clone)]
pub enum ApiError {
    #[error("sign in required")]
    Unauthenticated,
    #[error("session check in progress")]
    Loading,
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Auth(String),
    #[error("internal server error")]
    Internal(Arc<anyhow::Error>),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated => "UNAUTHENTICATED",
            ApiError::Loading => "LOADING",
            ApiError::Transport(_) => "TRANSPORT",
            ApiError::Validation(_) => "VALIDATION",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Auth(_) => "AUTH",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self::Internal(Arc::new(err))
    }
}

impl From<CrmError> for ApiError {
    fn from(value: CrmError) -> Self {
        match value {
            CrmError::Transport(err) => ApiError::Transport(err.to_string()),
            CrmError::Validation(msg) => ApiError::Validation(msg),
            err @ CrmError::NotFound(_) => ApiError::NotFound(err.to_string()),
            CrmError::Auth(msg) => ApiError::Auth(msg),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::internal(value)
    }
}

impl ErrorExtensions for ApiError {
    fn extend(&self) -> Error {
        if let ApiError::Internal(inner) = self {
            error!(error = ?inner, "internal error");
        }
        Error::new(self.to_string()).extend_with(|_err, e| {
            e.set("code", self.code());
        })
    }
}

/// GraphQL error carrying the stable `code` extension.
pub fn to_graphql(err: impl Into<ApiError>) -> Error {
    err.into().extend()
}

/// Convert any error into a GraphQL error payload while hiding internals.
pub fn internal_error(err: impl Into<anyhow::Error>) -> Error {
    ApiError::internal(err.into()).extend()
}
