//! Error model shared by every engine subsystem.
//!
//! Leaf errors are plain [`thiserror`] enums; callers that need to attach
//! context without discarding the original cause push onto `stack` rather
//! than wrapping in another variant, mirroring the detail-trail idiom the
//! Postgres backend uses for constraint-violation diagnostics.

use std::fmt;

/// The error kinds exposed at the wire boundary (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Dependency,
    Conflict,
    Busy,
    NotFound,
    Timeout,
    Cancelled,
    Interrupted,
    Internal,
}

/// A single engine-wide error type. Every subsystem (storage, ingestion,
/// task engine, algorithm, parameter store) returns this from its public
/// operations so callers at the wire boundary have one mapping to the HTTP
/// error shape (`{errorCode, message, details?}`).
#[derive(Debug, thiserror::Error)]
pub struct EngineError {
    kind: ErrorKind,
    message: String,
    stack: Vec<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for detail in &self.stack {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: Vec::new(),
            source: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dependency, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Busy, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Interrupted, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.stack.push(detail.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    /// One-line summary suitable for `Task.errorMessage` (§4.1 worker loop).
    #[must_use]
    pub fn as_task_summary(&self) -> String {
        let mut summary = format!("{}: {}", self.kind, self.message);
        summary.truncate(2048);
        summary
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_stack() {
        let err = EngineError::dependency("unknown style")
            .with_detail("sku=ABC123")
            .with_detail("row=14");
        let rendered = err.to_string();
        assert!(rendered.starts_with("DEPENDENCY: unknown style"));
        assert!(rendered.contains("sku=ABC123"));
        assert!(rendered.contains("row=14"));
    }

    #[test]
    fn task_summary_is_bounded() {
        let huge = "x".repeat(5000);
        let err = EngineError::internal(huge);
        assert!(err.as_task_summary().len() <= 2048);
    }
}
