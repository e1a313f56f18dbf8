//! Top-level translation entry point.
//!
//! Refuses requests whose source already matches the target, either as
//! declared by the caller or as detected, before any provider translates.

use crate::error::{Result, TranslateError};
use crate::language::LanguageCode;
use crate::provider::{Provider, TranslateOptions, Translation};
use crate::registry::Registry;
use std::sync::Arc;
use tracing::debug;

/// One translation call: content, target and the optional knobs.
#[derive(Debug, Clone)]
pub struct TranslateRequest<'a> {
    content: &'a str,
    to: LanguageCode,
    source: Option<LanguageCode>,
    preferred: Option<&'a str>,
    options: TranslateOptions,
}

impl<'a> TranslateRequest<'a> {
    pub fn new(content: &'a str, to: impl Into<LanguageCode>) -> Self {
        Self {
            content,
            to: to.into(),
            source: None,
            preferred: None,
            options: TranslateOptions::default(),
        }
    }

    /// Declare the source language instead of relying on detection alone
    pub fn from(mut self, source: impl Into<LanguageCode>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Prefer this provider when it supports the target language
    pub fn prefer(mut self, provider: &'a str) -> Self {
        self.preferred = Some(provider);
        self
    }

    pub fn options(mut self, options: TranslateOptions) -> Self {
        self.options = options;
        self
    }
}

pub struct Translator {
    registry: Arc<Registry>,
    detector: Option<String>,
}

impl Translator {
    /// Detection runs on the provider chosen for the translation unless a
    /// detector is configured with [`Translator::with_detector`].
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            detector: None,
        }
    }

    pub fn with_detector(mut self, provider: impl Into<String>) -> Self {
        self.detector = Some(provider.into());
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn detector(&self) -> Option<&str> {
        self.detector.as_deref()
    }

    fn configured_detector(&self) -> Result<Option<Arc<dyn Provider>>> {
        match &self.detector {
            Some(name) => self
                .registry
                .provider(name)
                .map(Some)
                .ok_or_else(|| TranslateError::UnknownProvider(name.clone())),
            None => Ok(None),
        }
    }

    /// Translate `request.content` into `request.to`.
    ///
    /// A declared source equal to the target fails with `SameLanguage`
    /// without touching any provider. Otherwise the content is detected and
    /// compared with the target first. When the translating provider cannot
    /// detect and no detector is configured, the comparison uses the source
    /// language reported with the translation instead.
    pub async fn translate(&self, request: TranslateRequest<'_>) -> Result<Translation> {
        let TranslateRequest {
            content,
            to,
            source,
            preferred,
            options,
        } = request;

        if let Some(source) = &source {
            if *source == to {
                return Err(same_language(&to, source));
            }
        }

        let provider = self.registry.provider_for(to.as_str(), preferred)?;

        let checked = match self.configured_detector()? {
            Some(detector) => {
                let detected = detector.detect(content.trim()).await?;
                reject_same(&to, &detected)?;
                true
            }
            None => match provider.detect(content.trim()).await {
                Ok(detected) => {
                    reject_same(&to, &detected)?;
                    true
                }
                Err(TranslateError::Unsupported { .. }) => {
                    debug!(
                        "Provider '{}' cannot detect, checking the reported source after translation",
                        provider.name()
                    );
                    false
                }
                Err(e) => return Err(e),
            },
        };

        debug!("Translating to '{}' with provider '{}'", to, provider.name());
        let translation = provider
            .translate(content, &to, source.as_ref(), &options)
            .await?;

        if !checked {
            if let Some(detected) = translation.source() {
                reject_same(&to, detected)?;
            }
        }
        Ok(translation)
    }

    /// Detect the language of `content`.
    ///
    /// Uses `preferred` when given, then the configured detector, then the
    /// first registered provider.
    pub async fn detect(&self, content: &str, preferred: Option<&str>) -> Result<LanguageCode> {
        let detector = match preferred {
            Some(name) => self
                .registry
                .provider(name)
                .ok_or_else(|| TranslateError::UnknownProvider(name.to_string()))?,
            None => match self.configured_detector()? {
                Some(detector) => detector,
                None => self.first_provider()?,
            },
        };
        detector.detect(content.trim()).await
    }

    fn first_provider(&self) -> Result<Arc<dyn Provider>> {
        self.registry
            .providers()
            .first()
            .and_then(|name| self.registry.provider(name))
            .ok_or(TranslateError::NoProviders)
    }
}

fn same_language(to: &LanguageCode, detected: &LanguageCode) -> TranslateError {
    TranslateError::SameLanguage {
        to: to.to_string(),
        detected: detected.to_string(),
    }
}

fn reject_same(to: &LanguageCode, detected: &LanguageCode) -> Result<()> {
    if detected == to {
        Err(same_language(to, detected))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::LanguageNames;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Calls {
        detect: AtomicUsize,
        translate: AtomicUsize,
    }

    struct ScriptedProvider {
        name: &'static str,
        languages: &'static [&'static str],
        /// `None` means the provider cannot detect
        detects_as: Option<&'static str>,
        reports_source: Option<&'static str>,
        calls: Arc<Calls>,
    }

    impl ScriptedProvider {
        fn new(name: &'static str, languages: &'static [&'static str], detects_as: Option<&'static str>) -> Self {
            Self {
                name,
                languages,
                detects_as,
                reports_source: None,
                calls: Arc::new(Calls::default()),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn get_languages(&self, _locale: Option<&str>) -> Result<LanguageNames> {
            Ok(self.languages.iter().map(|code| (*code, code.to_uppercase())).collect())
        }

        async fn detect(&self, text: &str) -> Result<LanguageCode> {
            self.calls.detect.fetch_add(1, Ordering::SeqCst);
            assert_eq!(text, text.trim(), "detection input must be trimmed");
            match self.detects_as {
                Some(code) => Ok(LanguageCode::new(code)),
                None => Err(TranslateError::Unsupported {
                    provider: self.name.to_string(),
                    operation: "detect",
                }),
            }
        }

        async fn translate(
            &self,
            text: &str,
            to: &LanguageCode,
            source: Option<&LanguageCode>,
            _options: &TranslateOptions,
        ) -> Result<Translation> {
            self.calls.translate.fetch_add(1, Ordering::SeqCst);
            let reported = self.reports_source.map(LanguageCode::new).or_else(|| source.cloned());
            Ok(Translation::new(format!("[{}] {}", to, text), to.clone(), reported))
        }
    }

    async fn translator_with(providers: Vec<ScriptedProvider>) -> Translator {
        let registry = Registry::new();
        for provider in providers {
            registry.add_provider(Box::new(provider)).await.unwrap();
        }
        Translator::new(Arc::new(registry))
    }

    // ==================== Same Language Tests ====================

    #[tokio::test]
    async fn test_declared_same_language_makes_no_calls() {
        let provider = ScriptedProvider::new("azure", &["fr", "en"], Some("en"));
        let calls = Arc::clone(&provider.calls);
        let translator = translator_with(vec![provider]).await;

        let result = translator
            .translate(TranslateRequest::new("Bonjour", "FR").from("fr"))
            .await;

        assert!(matches!(result, Err(TranslateError::SameLanguage { .. })));
        assert_eq!(calls.detect.load(Ordering::SeqCst), 0);
        assert_eq!(calls.translate.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_detected_same_language_is_rejected() {
        let provider = ScriptedProvider::new("azure", &["fr"], Some("fr"));
        let calls = Arc::clone(&provider.calls);
        let translator = translator_with(vec![provider]).await;

        match translator.translate(TranslateRequest::new("  Bonjour  ", "fr")).await {
            Err(TranslateError::SameLanguage { to, detected }) => {
                assert_eq!(to, "fr");
                assert_eq!(detected, "fr");
            }
            other => panic!("expected SameLanguage, got {:?}", other),
        }
        assert_eq!(calls.detect.load(Ordering::SeqCst), 1);
        assert_eq!(calls.translate.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_translates_after_detection() {
        let provider = ScriptedProvider::new("azure", &["fr"], Some("en"));
        let calls = Arc::clone(&provider.calls);
        let translator = translator_with(vec![provider]).await;

        let translation = translator
            .translate(TranslateRequest::new("Hello", "fr").from("en"))
            .await
            .unwrap();

        assert_eq!(translation.text(), "[fr] Hello");
        assert_eq!(translation.source().map(LanguageCode::as_str), Some("en"));
        assert_eq!(calls.detect.load(Ordering::SeqCst), 1);
        assert_eq!(calls.translate.load(Ordering::SeqCst), 1);
    }

    // ==================== Detection Provider Tests ====================

    #[tokio::test]
    async fn test_configured_detector_is_used() {
        let translating = ScriptedProvider::new("deepl", &["de"], None);
        let detecting = ScriptedProvider::new("azure", &["fr"], Some("de"));
        let translating_calls = Arc::clone(&translating.calls);
        let detecting_calls = Arc::clone(&detecting.calls);
        let translator = translator_with(vec![translating, detecting])
            .await
            .with_detector("Azure");

        let result = translator.translate(TranslateRequest::new("Hallo", "de")).await;

        assert!(matches!(result, Err(TranslateError::SameLanguage { .. })));
        assert_eq!(detecting_calls.detect.load(Ordering::SeqCst), 1);
        assert_eq!(translating_calls.detect.load(Ordering::SeqCst), 0);
        assert_eq!(translating_calls.translate.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_detector_fails() {
        let translator = translator_with(vec![ScriptedProvider::new("azure", &["fr"], Some("en"))])
            .await
            .with_detector("google");

        assert!(matches!(
            translator.translate(TranslateRequest::new("Hello", "fr")).await,
            Err(TranslateError::UnknownProvider(name)) if name == "google"
        ));
    }

    #[tokio::test]
    async fn test_non_detecting_provider_checks_reported_source() {
        let mut provider = ScriptedProvider::new("deepl", &["de"], None);
        provider.reports_source = Some("DE");
        let calls = Arc::clone(&provider.calls);
        let translator = translator_with(vec![provider]).await;

        let result = translator.translate(TranslateRequest::new("Hallo", "de")).await;

        assert!(matches!(result, Err(TranslateError::SameLanguage { .. })));
        assert_eq!(calls.translate.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_detecting_provider_translates() {
        let mut provider = ScriptedProvider::new("deepl", &["de"], None);
        provider.reports_source = Some("en");
        let translator = translator_with(vec![provider]).await;

        let translation = translator
            .translate(TranslateRequest::new("Hello", "de"))
            .await
            .unwrap();
        assert_eq!(translation.to().as_str(), "de");
    }

    // ==================== Dispatch Tests ====================

    #[tokio::test]
    async fn test_preference_is_forwarded_to_registry() {
        let azure = ScriptedProvider::new("azure", &["fr"], Some("en"));
        let google = ScriptedProvider::new("google", &["fr"], Some("en"));
        let azure_calls = Arc::clone(&azure.calls);
        let google_calls = Arc::clone(&google.calls);
        let translator = translator_with(vec![azure, google]).await;

        translator
            .translate(TranslateRequest::new("Hello", "fr").prefer("google"))
            .await
            .unwrap();

        assert_eq!(google_calls.translate.load(Ordering::SeqCst), 1);
        assert_eq!(azure_calls.translate.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_target_skips_detection() {
        let provider = ScriptedProvider::new("azure", &["fr"], Some("en"));
        let calls = Arc::clone(&provider.calls);
        let translator = translator_with(vec![provider]).await;

        assert!(matches!(
            translator.translate(TranslateRequest::new("Hello", "tlh")).await,
            Err(TranslateError::LanguageNotSupported { .. })
        ));
        assert_eq!(calls.detect.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let translator = Translator::new(Arc::new(Registry::new()));
        assert!(matches!(
            translator.translate(TranslateRequest::new("Hello", "fr")).await,
            Err(TranslateError::NoProviders)
        ));
        assert!(matches!(
            translator.detect("Hello", None).await,
            Err(TranslateError::NoProviders)
        ));
    }

    // ==================== detect Tests ====================

    #[tokio::test]
    async fn test_detect_prefers_named_then_configured_then_first() {
        let translator = translator_with(vec![
            ScriptedProvider::new("azure", &["fr"], Some("en")),
            ScriptedProvider::new("google", &["fr"], Some("ja")),
        ])
        .await;

        assert_eq!(translator.detect(" x ", None).await.unwrap(), "en");
        assert_eq!(translator.detect("x", Some("GOOGLE")).await.unwrap(), "ja");

        let translator = translator.with_detector("google");
        assert_eq!(translator.detect("x", None).await.unwrap(), "ja");
        assert!(matches!(
            translator.detect("x", Some("deepl")).await,
            Err(TranslateError::UnknownProvider(_))
        ));
    }
}
