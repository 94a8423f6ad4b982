use std::fmt;

use serde::Serialize;

/// A single rejected field of an [`ImageDraft`](crate::store::ImageDraft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// camelCase field name as it appears in JSON
    pub field: &'static str,
    pub message: String,
}

/// Every field that failed validation, in form order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|error| error.field == field)
            .map(|error| error.message.as_str())
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<_> = self
            .0
            .iter()
            .map(|error| format!("{}: {}", error.field, error.message))
            .collect();
        f.write_str(&messages.join("; "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid image metadata: {0}")]
    Validation(ValidationErrors),

    /// Storage write failed; the attempted change was not kept.
    #[error("{context}: {source}")]
    Persistence {
        context: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StoreError {
    pub(crate) fn persistence(context: &'static str, err: anyhow::Error) -> Self {
        Self::Persistence {
            context,
            source: err.into(),
        }
    }
}

/// Rejected upload payload
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("uploaded file is empty")]
    Empty,

    #[error("unsupported content type: {0}")]
    NotAnImage(String),

    #[error("file content is not a recognized image format")]
    UnknownFormat,

    #[error("malformed data URI: {0}")]
    MalformedDataUri(String),
}
