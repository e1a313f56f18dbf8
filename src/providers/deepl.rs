use super::{decode, DEFAULT_TIMEOUT};
use crate::credentials::CredentialPool;
use crate::engine::{Failure, RequestEngine, ResponseBody};
use crate::error::{Result, TranslateError, UpstreamError};
use crate::language::{LanguageCode, LanguageNames};
use crate::provider::{Lifecycle, LifecycleState, Provider, TranslateOptions, Translation};
use crate::retry::RetryConfig;
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

pub const DEEPL_FREE_ENDPOINT: &str = "https://api-free.deepl.com/";
pub const DEEPL_PRO_ENDPOINT: &str = "https://api.deepl.com/";
const NAME: &str = "deepl";

/// DeepL's "quota exceeded" status
const QUOTA_EXCEEDED: u16 = 456;
/// 529 is DeepL's "too many requests" under load
const TRANSIENT_STATUSES: [u16; 6] = [429, 500, 502, 503, 504, 529];

#[derive(Debug, Deserialize)]
struct DeepLLanguage {
    language: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    detected_source_language: Option<String>,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// DeepL translator (API v2).
///
/// Keys ending in `:fx` belong to the free tier and are sent to the free
/// endpoint; other keys go to the pro endpoint. DeepL has no detection
/// endpoint, so [`Provider::detect`] reports `Unsupported`.
pub struct DeepL {
    client: reqwest::Client,
    endpoint_override: Option<String>,
    engine: RequestEngine,
    lifecycle: Lifecycle,
}

impl DeepL {
    pub fn new<I, S>(auth_keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pool = CredentialPool::new(NAME, auth_keys)?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint_override: None,
            engine: RequestEngine::new(NAME, pool).with_timeout(DEFAULT_TIMEOUT),
            lifecycle: Lifecycle::default(),
        })
    }

    /// Send every key to this base URL instead of the free/pro endpoints
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let mut endpoint = endpoint.into();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        self.endpoint_override = Some(endpoint);
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.engine = self.engine.with_retry_config(retry);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.engine = self.engine.with_timeout(timeout);
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn credentials(&self) -> &CredentialPool {
        self.engine.pool()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    fn endpoint_for(&self, key: &str) -> &str {
        match &self.endpoint_override {
            Some(endpoint) => endpoint.as_str(),
            None if key.ends_with(":fx") => DEEPL_FREE_ENDPOINT,
            None => DEEPL_PRO_ENDPOINT,
        }
    }

    async fn request(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        self.lifecycle.ensure_open(NAME)?;

        self.engine
            .execute(operation, |key| {
                let url = format!("{}v2/{}", self.endpoint_for(&key), path);
                let mut request = self
                    .client
                    .request(method.clone(), url)
                    .query(params)
                    .header("Authorization", format!("DeepL-Auth-Key {}", key));
                if let Some(body) = &body {
                    request = request.json(body);
                }

                async move {
                    let response = request.send().await.map_err(Failure::from_reqwest)?;
                    classify(ResponseBody::read(response).await?)
                }
            })
            .await
    }
}

fn classify(body: ResponseBody) -> std::result::Result<serde_json::Value, Failure> {
    if body.is_success() {
        return body.into_json();
    }

    let message = body
        .json
        .as_ref()
        .and_then(|json| serde_json::from_value::<ErrorBody>(json.clone()).ok())
        .map(|e| e.message)
        .unwrap_or_else(|| body.text.clone());
    let error = UpstreamError::new(Some(body.status), None, message);

    match body.status {
        QUOTA_EXCEEDED | 403 => Err(Failure::QuotaExhausted(error)),
        status if TRANSIENT_STATUSES.contains(&status) => Err(Failure::transient(error)),
        _ => Err(Failure::Fatal(TranslateError::UpstreamRequest(error))),
    }
}

/// DeepL names the offending parameter in its 400 message.
fn map_language_error(err: TranslateError, to: &LanguageCode, source: Option<&LanguageCode>) -> TranslateError {
    let message = match &err {
        TranslateError::UpstreamRequest(UpstreamError { status: Some(400), message, .. }) => message.as_str(),
        _ => return err,
    };
    if message.contains("source_lang") {
        TranslateError::unsupported_source(source.map(|s| s.to_string()).unwrap_or_default())
    } else if message.contains("target_lang") {
        TranslateError::unsupported_target(to.to_string())
    } else {
        err
    }
}

#[async_trait]
impl Provider for DeepL {
    fn name(&self) -> &str {
        NAME
    }

    /// DeepL only names languages in English; `locale` is ignored.
    async fn get_languages(&self, _locale: Option<&str>) -> Result<LanguageNames> {
        let raw = self
            .request("languages", Method::GET, "languages", &[("type", "target")], None)
            .await?;
        let languages: Vec<DeepLLanguage> = decode(raw, "languages")?;
        self.lifecycle.mark_ready();

        debug!("deepl: {} target languages", languages.len());
        Ok(languages
            .into_iter()
            .map(|lang| (lang.language.to_lowercase(), lang.name))
            .collect())
    }

    async fn detect(&self, _text: &str) -> Result<LanguageCode> {
        Err(TranslateError::Unsupported {
            provider: NAME.to_string(),
            operation: "detect",
        })
    }

    async fn translate(
        &self,
        text: &str,
        to: &LanguageCode,
        source: Option<&LanguageCode>,
        options: &TranslateOptions,
    ) -> Result<Translation> {
        let mut body = serde_json::json!({
            "text": [text],
            "target_lang": to.as_str().to_uppercase(),
        });
        if let Some(source) = source {
            body["source_lang"] = serde_json::Value::from(source.as_str().to_uppercase());
        }
        for (key, value) in &options.extra {
            body[key.as_str()] = serde_json::Value::from(value.as_str());
        }

        let raw = self
            .request("translate", Method::POST, "translate", &[], Some(body))
            .await
            .map_err(|e| map_language_error(e, to, source))?;

        let response: TranslateResponse = decode(raw, "translate")?;
        let translation = response
            .translations
            .into_iter()
            .next()
            .ok_or_else(|| TranslateError::Transport("translate returned no translations".to_string()))?;

        let detected = translation
            .detected_source_language
            .map(|code| LanguageCode::new(code.to_lowercase()));
        Ok(Translation::new(
            translation.text,
            to.clone(),
            detected.or_else(|| source.cloned()),
        ))
    }

    async fn close(&self) -> Result<()> {
        if self.lifecycle.close() {
            info!("deepl: provider closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn deepl(server: &MockServer, keys: &[&str]) -> DeepL {
        DeepL::new(keys.iter().copied())
            .unwrap()
            .with_endpoint(server.uri())
            .with_retry_config(RetryConfig::new(2, Duration::from_millis(5)))
    }

    #[test]
    fn test_free_keys_use_free_endpoint() {
        let deepl = DeepL::new(["abc:fx"]).unwrap();
        assert_eq!(deepl.endpoint_for("abc:fx"), DEEPL_FREE_ENDPOINT);
        assert_eq!(deepl.endpoint_for("abc"), DEEPL_PRO_ENDPOINT);
    }

    #[tokio::test]
    async fn test_get_languages_lowercases_codes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/languages"))
            .and(query_param("type", "target"))
            .and(header("Authorization", "DeepL-Auth-Key key:fx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "language": "EN-GB", "name": "English (British)" },
                { "language": "DE", "name": "German" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let deepl = deepl(&server, &["key:fx"]);
        let languages = deepl.get_languages(Some("fr")).await.unwrap();

        assert_eq!(languages.original_key("EN-GB"), Some("en-gb"));
        assert_eq!(languages.get("de").map(String::as_str), Some("German"));
    }

    #[tokio::test]
    async fn test_detect_is_unsupported() {
        let server = MockServer::start().await;
        let deepl = deepl(&server, &["k"]);
        assert!(matches!(
            deepl.detect("hallo").await,
            Err(TranslateError::Unsupported { operation: "detect", .. })
        ));
    }

    #[tokio::test]
    async fn test_quota_exceeded_rotates_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "DeepL-Auth-Key spent"))
            .respond_with(ResponseTemplate::new(456).set_body_json(serde_json::json!({ "message": "Quota exceeded" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/translate"))
            .and(header("Authorization", "DeepL-Auth-Key fresh"))
            .and(body_json(serde_json::json!({
                "text": ["Guten Tag"],
                "target_lang": "EN-GB",
                "formality": "less"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "translations": [{ "detected_source_language": "DE", "text": "Good day" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let deepl = deepl(&server, &["spent", "fresh"]);
        let options = TranslateOptions::default().with_extra("formality", "less");
        let translation = deepl
            .translate("Guten Tag", &"en-gb".into(), None, &options)
            .await
            .unwrap();

        assert_eq!(translation.text(), "Good day");
        assert_eq!(translation.source().map(LanguageCode::as_str), Some("de"));
        assert_eq!(deepl.credentials().current(), (1, "fresh"));
    }

    #[tokio::test]
    async fn test_unsupported_target_language() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "message": "Value for 'target_lang' not supported."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let deepl = deepl(&server, &["k"]);
        let result = deepl
            .translate("hi", &"tlh".into(), None, &TranslateOptions::default())
            .await;
        assert!(matches!(
            result,
            Err(TranslateError::LanguageNotSupported { ref language, .. }) if language == "tlh"
        ));
    }

    #[tokio::test]
    async fn test_overloaded_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(529).set_body_string("Too many requests"))
            .expect(2)
            .mount(&server)
            .await;

        let deepl = deepl(&server, &["k1", "k2"]);
        assert!(matches!(
            deepl.get_languages(None).await,
            Err(TranslateError::RetriesExhausted { attempts: 2, .. })
        ));
        assert_eq!(deepl.state(), LifecycleState::Uninitialized);
    }
}
