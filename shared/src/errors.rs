use thiserror::Error;

/// Every failure a handler can surface. The `Display` text is the
/// user-facing message returned in the error envelope, so each variant
/// carries the complete (already prefixed) message.
#[derive(Error, Debug, Clone)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Identity(String),

    #[error("{0}")]
    Store(String),

    #[error("{0}")]
    Email(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    NoData(String),

    #[error("{0}")]
    Report(String),

    #[error("{0}")]
    Serialization(String),
}

impl ServiceError {
    /// Short tag used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::Configuration(_) => "configuration",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::Identity(_) => "identity",
            ServiceError::Store(_) => "store",
            ServiceError::Email(_) => "email",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::NoData(_) => "no_data",
            ServiceError::Report(_) => "report",
            ServiceError::Serialization(_) => "serialization",
        }
    }

    /// Re-wrap an upstream error with a contextual prefix, keeping its class.
    pub fn with_context(self, prefix: &str) -> Self {
        let wrap = |msg: String| format!("{}{}", prefix, msg);
        match self {
            ServiceError::Identity(m) => ServiceError::Identity(wrap(m)),
            ServiceError::Store(m) => ServiceError::Store(wrap(m)),
            ServiceError::Email(m) => ServiceError::Email(wrap(m)),
            other => other,
        }
    }

    /// All error paths converge on the same status.
    pub fn status_code(&self) -> u16 {
        400
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Serialization(format!("JSON inválido: {}", err))
    }
}

impl From<rust_xlsxwriter::XlsxError> for ServiceError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        ServiceError::Report(format!("Erro ao gerar planilha: {}", err))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
