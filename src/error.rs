use thiserror::Error;

/// Request-scoped failure. Nothing here is fatal to the process.
#[derive(Debug, Error)]
pub enum AppError {
    /// No valid session; `next` is the path to come back to after login.
    #[error("authentication required")]
    AuthenticationRequired { next: String },

    #[error("permission denied: {0}")]
    AuthorizationDenied(String),

    #[error("{message}")]
    Validation {
        code: &'static str,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(self, details: serde_json::Value) -> Self {
        match self {
            AppError::Validation { code, message, .. } => AppError::Validation {
                code,
                message,
                details: Some(details),
            },
            other => other,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation { .. })
    }
}

pub type AppResult<T> = Result<T, AppError>;
