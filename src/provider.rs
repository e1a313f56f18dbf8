//! The capability interface every upstream integration implements.

use crate::error::{Result, TranslateError};
use crate::language::{LanguageCode, LanguageNames};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};

/// A finished translation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    text: String,
    to: LanguageCode,
    source: Option<LanguageCode>,
}

impl Translation {
    pub fn new(text: impl Into<String>, to: impl Into<LanguageCode>, source: Option<LanguageCode>) -> Self {
        Self {
            text: text.into(),
            to: to.into(),
            source,
        }
    }

    /// The translated text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The language the text was translated to
    pub fn to(&self) -> &LanguageCode {
        &self.to
    }

    /// The source language, when declared by the caller or detected upstream
    pub fn source(&self) -> Option<&LanguageCode> {
        self.source.as_ref()
    }
}

/// How a provider should treat profanity in translated text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProfanityFilter {
    /// Leave profanity as is
    #[default]
    Off,
    /// Mark profanity with tags
    Tag,
    /// Mask profanity
    Mark,
}

impl ProfanityFilter {
    /// Parse the numeric level used in configuration (0, 1, 2).
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(ProfanityFilter::Off),
            1 => Some(ProfanityFilter::Tag),
            2 => Some(ProfanityFilter::Mark),
            _ => None,
        }
    }
}

/// Provider-specific options forwarded opaquely by the orchestration layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslateOptions {
    pub profanity_filter: ProfanityFilter,
    /// Extra parameters a provider may understand (e.g. DeepL `formality`)
    pub extra: BTreeMap<String, String>,
}

impl TranslateOptions {
    pub fn with_profanity_filter(mut self, filter: ProfanityFilter) -> Self {
        self.profanity_filter = filter;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// One upstream translation/detection service.
///
/// Implementations are owned by a [`crate::registry::Registry`] once added and
/// are only ever reached through `Arc<dyn Provider>`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Identity of the provider; the registry compares it case-insensitively.
    fn name(&self) -> &str;

    /// Supported languages mapped to display names, optionally localised to `locale`.
    async fn get_languages(&self, locale: Option<&str>) -> Result<LanguageNames>;

    /// Detect the language of `text`.
    async fn detect(&self, text: &str) -> Result<LanguageCode>;

    /// Translate `text` into `to`, optionally declaring its source language.
    async fn translate(
        &self,
        text: &str,
        to: &LanguageCode,
        source: Option<&LanguageCode>,
        options: &TranslateOptions,
    ) -> Result<Translation>;

    /// Release held connections. Must be safe to call more than once.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Lifecycle of a provider instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Ready,
    Closed,
}

/// Lock-free lifecycle tracker shared by provider implementations.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

const UNINITIALIZED: u8 = 0;
const READY: u8 = 1;
const CLOSED: u8 = 2;

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(UNINITIALIZED),
        }
    }
}

impl Lifecycle {
    pub fn state(&self) -> LifecycleState {
        match self.state.load(Ordering::Acquire) {
            UNINITIALIZED => LifecycleState::Uninitialized,
            READY => LifecycleState::Ready,
            _ => LifecycleState::Closed,
        }
    }

    /// Move uninitialized → ready. A closed provider stays closed.
    pub fn mark_ready(&self) {
        let _ = self
            .state
            .compare_exchange(UNINITIALIZED, READY, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Move to closed. Returns `false` if the provider was already closed.
    pub fn close(&self) -> bool {
        self.state.swap(CLOSED, Ordering::AcqRel) != CLOSED
    }

    /// Fail with `ProviderClosed` once the provider has been closed.
    pub fn ensure_open(&self, provider: &str) -> Result<()> {
        if self.state() == LifecycleState::Closed {
            return Err(TranslateError::ProviderClosed(provider.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_accessors() {
        let t = Translation::new("Bonjour", "fr", Some(LanguageCode::new("en")));
        assert_eq!(t.text(), "Bonjour");
        assert_eq!(t.to(), &LanguageCode::new("FR"));
        assert_eq!(t.source().map(LanguageCode::as_str), Some("en"));
    }

    #[test]
    fn test_profanity_filter_levels() {
        assert_eq!(ProfanityFilter::from_level(0), Some(ProfanityFilter::Off));
        assert_eq!(ProfanityFilter::from_level(1), Some(ProfanityFilter::Tag));
        assert_eq!(ProfanityFilter::from_level(2), Some(ProfanityFilter::Mark));
        assert_eq!(ProfanityFilter::from_level(3), None);
        assert_eq!(ProfanityFilter::default(), ProfanityFilter::Off);
    }

    #[test]
    fn test_translate_options_builder() {
        let options = TranslateOptions::default()
            .with_profanity_filter(ProfanityFilter::Tag)
            .with_extra("formality", "less");
        assert_eq!(options.profanity_filter, ProfanityFilter::Tag);
        assert_eq!(options.extra.get("formality").map(String::as_str), Some("less"));
    }

    // ==================== Lifecycle Tests ====================

    #[test]
    fn test_lifecycle_transitions() {
        let lifecycle = Lifecycle::default();
        assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);
        assert!(lifecycle.ensure_open("p").is_ok());

        lifecycle.mark_ready();
        assert_eq!(lifecycle.state(), LifecycleState::Ready);

        assert!(lifecycle.close());
        assert_eq!(lifecycle.state(), LifecycleState::Closed);
        assert!(!lifecycle.close(), "second close reports already closed");
    }

    #[test]
    fn test_lifecycle_closed_is_terminal() {
        let lifecycle = Lifecycle::default();
        lifecycle.close();
        lifecycle.mark_ready();
        assert_eq!(lifecycle.state(), LifecycleState::Closed);
        assert!(matches!(
            lifecycle.ensure_open("azure"),
            Err(TranslateError::ProviderClosed(name)) if name == "azure"
        ));
    }
}
