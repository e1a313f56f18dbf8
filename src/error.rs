//! Error taxonomy shared by the registry, the request engine and every provider.

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TranslateError>;

/// Which side of a translation an unsupported language was given for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageDirection {
    Source,
    Target,
}

impl fmt::Display for LanguageDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageDirection::Source => write!(f, "from"),
            LanguageDirection::Target => write!(f, "to"),
        }
    }
}

/// Error details reported by an upstream service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError {
    /// HTTP status of the response, when one was received
    pub status: Option<u16>,
    /// Service-specific error code (e.g. Azure's 400036)
    pub code: Option<i64>,
    pub message: String,
}

impl UpstreamError {
    pub fn new(status: Option<u16>, code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.code) {
            (Some(status), Some(code)) => write!(f, "HTTP {} code {}: {}", status, code, self.message),
            (Some(status), None) => write!(f, "HTTP {}: {}", status, self.message),
            (None, Some(code)) => write!(f, "code {}: {}", code, self.message),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("A provider with the name '{0}' has already been added")]
    DuplicateProvider(String),

    #[error("Language '{language}' is not supported ({direction})")]
    LanguageNotSupported {
        language: String,
        direction: LanguageDirection,
    },

    #[error("No providers have been added")]
    NoProviders,

    #[error("No provider named '{0}' has been added")]
    UnknownProvider(String),

    #[error("Cannot translate to '{to}': content is already in '{detected}'")]
    SameLanguage { to: String, detected: String },

    #[error("All {credentials} credentials of provider '{provider}' are exhausted (last: {last})")]
    AllCredentialsExhausted {
        provider: String,
        credentials: usize,
        last: UpstreamError,
    },

    #[error("Upstream request failed: {0}")]
    UpstreamRequest(UpstreamError),

    #[error("Giving up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: UpstreamError },

    #[error("Malformed upstream response: {0}")]
    Transport(String),

    #[error("Provider '{0}' requires at least one credential")]
    NoCredentials(String),

    #[error("Provider '{0}' is closed")]
    ProviderClosed(String),

    #[error("Provider '{provider}' does not support {operation}")]
    Unsupported {
        provider: String,
        operation: &'static str,
    },

    #[error("Failed to close {} provider(s): {}", .0.len(), format_close_errors(.0))]
    Close(Vec<(String, TranslateError)>),
}

impl TranslateError {
    /// Shorthand for a target-side `LanguageNotSupported`.
    pub fn unsupported_target(language: impl Into<String>) -> Self {
        TranslateError::LanguageNotSupported {
            language: language.into(),
            direction: LanguageDirection::Target,
        }
    }

    /// Shorthand for a source-side `LanguageNotSupported`.
    pub fn unsupported_source(language: impl Into<String>) -> Self {
        TranslateError::LanguageNotSupported {
            language: language.into(),
            direction: LanguageDirection::Source,
        }
    }
}

fn format_close_errors(errors: &[(String, TranslateError)]) -> String {
    errors
        .iter()
        .map(|(name, e)| format!("{}: {}", name, e))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_display_variants() {
        assert_eq!(
            UpstreamError::new(Some(400), Some(400036), "bad to").to_string(),
            "HTTP 400 code 400036: bad to"
        );
        assert_eq!(
            UpstreamError::new(Some(503), None, "busy").to_string(),
            "HTTP 503: busy"
        );
        assert_eq!(
            UpstreamError::new(None, Some(7), "odd").to_string(),
            "code 7: odd"
        );
        assert_eq!(UpstreamError::new(None, None, "timeout").to_string(), "timeout");
    }

    #[test]
    fn test_language_not_supported_mentions_direction() {
        let err = TranslateError::unsupported_source("xx");
        assert!(err.to_string().contains("xx"));
        assert!(err.to_string().contains("from"));

        let err = TranslateError::unsupported_target("yy");
        assert!(err.to_string().contains("to"));
    }

    #[test]
    fn test_close_error_lists_every_provider() {
        let err = TranslateError::Close(vec![
            ("azure".to_string(), TranslateError::Transport("boom".to_string())),
            ("deepl".to_string(), TranslateError::NoProviders),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("2 provider(s)"));
        assert!(msg.contains("azure: Malformed upstream response: boom"));
        assert!(msg.contains("deepl"));
    }
}
