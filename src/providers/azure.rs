use super::{decode, DEFAULT_TIMEOUT, DEFAULT_TRANSIENT_STATUSES};
use crate::credentials::CredentialPool;
use crate::engine::{Failure, RequestEngine, ResponseBody};
use crate::error::{Result, TranslateError, UpstreamError};
use crate::language::{LanguageCode, LanguageNames};
use crate::provider::{
    Lifecycle, LifecycleState, ProfanityFilter, Provider, TranslateOptions, Translation,
};
use crate::retry::RetryConfig;
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

pub const AZURE_ENDPOINT: &str = "https://api.cognitive.microsofttranslator.com/";
const API_VERSION: &str = "3.0";
const NAME: &str = "azure";

/// Error codes meaning the subscription key itself is unusable (bad key or used-up quota)
const QUOTA_CODES: [i64; 6] = [401000, 403000, 403001, 429000, 429001, 429002];
/// Invalid or unsupported `from` language
const SOURCE_LANGUAGE_CODES: [i64; 2] = [400018, 400035];
/// Invalid or unsupported `to` language
const TARGET_LANGUAGE_CODES: [i64; 2] = [400004, 400036];

#[derive(Debug, Deserialize)]
struct LanguagesResponse {
    translation: HashMap<String, LanguageEntry>,
}

#[derive(Debug, Deserialize)]
struct LanguageEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DetectEntry {
    language: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateEntry {
    detected_language: Option<DetectEntry>,
    translations: Vec<TranslatedText>,
}

#[derive(Debug, Deserialize)]
struct TranslatedText {
    text: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    message: String,
}

/// Microsoft Azure Cognitive Services translator.
///
/// Holds one or more subscription keys; a key whose quota is used up is
/// rotated out and the request is repeated with the next one.
pub struct Azure {
    client: reqwest::Client,
    endpoint: String,
    engine: RequestEngine,
    transient_statuses: Vec<u16>,
    lifecycle: Lifecycle,
}

impl Azure {
    /// Create a provider from a non-empty list of subscription keys.
    pub fn new<I, S>(api_keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pool = CredentialPool::new(NAME, api_keys)?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: AZURE_ENDPOINT.to_string(),
            engine: RequestEngine::new(NAME, pool).with_timeout(DEFAULT_TIMEOUT),
            transient_statuses: DEFAULT_TRANSIENT_STATUSES.to_vec(),
            lifecycle: Lifecycle::default(),
        })
    }

    /// Point the provider at a different base URL (must end with `/`)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let mut endpoint = endpoint.into();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        self.endpoint = endpoint;
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

    /// HTTP statuses retried with backoff on the same key
    pub fn with_transient_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.transient_statuses = statuses.into_iter().collect();
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

    async fn request(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<serde_json::Value>,
        accept_language: Option<&str>,
    ) -> Result<serde_json::Value> {
        self.lifecycle.ensure_open(NAME)?;
        let url = format!("{}{}", self.endpoint, path);
        let statuses = self.transient_statuses.as_slice();

        self.engine
            .execute(operation, |key| {
                let mut request = self
                    .client
                    .request(method.clone(), &url)
                    .query(&[("api-version", API_VERSION)])
                    .query(params)
                    .header("Ocp-Apim-Subscription-Key", key);
                if let Some(locale) = accept_language {
                    request = request.header("Accept-Language", locale);
                }
                if let Some(body) = &body {
                    request = request.json(body);
                }

                async move {
                    let response = request.send().await.map_err(Failure::from_reqwest)?;
                    classify(ResponseBody::read(response).await?, statuses)
                }
            })
            .await
    }
}

/// Sort an Azure response into success or one of the engine's failure classes.
fn classify(body: ResponseBody, transient_statuses: &[u16]) -> std::result::Result<serde_json::Value, Failure> {
    let error = body
        .json
        .as_ref()
        .and_then(|json| serde_json::from_value::<ErrorEnvelope>(json.clone()).ok())
        .map(|envelope| UpstreamError::new(Some(body.status), Some(envelope.error.code), envelope.error.message));

    if body.is_success() && error.is_none() {
        return body.into_json();
    }

    let quota = error
        .as_ref()
        .and_then(|e| e.code)
        .is_some_and(|code| QUOTA_CODES.contains(&code));

    if transient_statuses.contains(&body.status) {
        let error = error.unwrap_or_else(|| UpstreamError::new(Some(body.status), None, body.text));
        return Err(Failure::Transient { error, quota });
    }

    match error {
        Some(error) if quota => Err(Failure::QuotaExhausted(error)),
        Some(error) => Err(Failure::Fatal(TranslateError::UpstreamRequest(error))),
        None if body.json.is_none() => Err(Failure::Fatal(TranslateError::Transport(body.text))),
        None => Err(Failure::Fatal(TranslateError::UpstreamRequest(UpstreamError::new(
            Some(body.status),
            None,
            body.text,
        )))),
    }
}

/// Turn Azure's invalid-language codes into `LanguageNotSupported`.
fn map_language_error(err: TranslateError, to: &LanguageCode, source: Option<&LanguageCode>) -> TranslateError {
    let code = match &err {
        TranslateError::UpstreamRequest(UpstreamError { code: Some(code), .. }) => *code,
        _ => return err,
    };
    if SOURCE_LANGUAGE_CODES.contains(&code) {
        TranslateError::unsupported_source(source.map(|s| s.to_string()).unwrap_or_default())
    } else if TARGET_LANGUAGE_CODES.contains(&code) {
        TranslateError::unsupported_target(to.to_string())
    } else {
        err
    }
}

#[async_trait]
impl Provider for Azure {
    fn name(&self) -> &str {
        NAME
    }

    async fn get_languages(&self, locale: Option<&str>) -> Result<LanguageNames> {
        let raw = self
            .request(
                "languages",
                Method::GET,
                "languages",
                &[("scope", "translation")],
                None,
                locale,
            )
            .await?;
        let response: LanguagesResponse = decode(raw, "languages")?;
        self.lifecycle.mark_ready();

        debug!("azure: {} translation languages", response.translation.len());
        Ok(response
            .translation
            .into_iter()
            .map(|(code, entry)| (code, entry.name))
            .collect())
    }

    async fn detect(&self, text: &str) -> Result<LanguageCode> {
        let raw = self
            .request(
                "detect",
                Method::POST,
                "detect",
                &[],
                Some(serde_json::json!([{ "Text": text }])),
                None,
            )
            .await?;
        let entries: Vec<DetectEntry> = decode(raw, "detect")?;
        entries
            .into_iter()
            .next()
            .map(|entry| LanguageCode::new(entry.language))
            .ok_or_else(|| TranslateError::Transport("empty detect response".to_string()))
    }

    async fn translate(
        &self,
        text: &str,
        to: &LanguageCode,
        source: Option<&LanguageCode>,
        options: &TranslateOptions,
    ) -> Result<Translation> {
        let mut params = vec![("to", to.as_str())];
        if let Some(source) = source {
            params.push(("from", source.as_str()));
        }
        match options.profanity_filter {
            ProfanityFilter::Off => params.push(("profanityAction", "NoAction")),
            ProfanityFilter::Tag => {
                params.push(("profanityAction", "Marked"));
                params.push(("profanityMarker", "Tag"));
            }
            ProfanityFilter::Mark => params.push(("profanityAction", "Marked")),
        }
        for (key, value) in &options.extra {
            params.push((key.as_str(), value.as_str()));
        }

        let raw = self
            .request(
                "translate",
                Method::POST,
                "translate",
                &params,
                Some(serde_json::json!([{ "Text": text }])),
                None,
            )
            .await
            .map_err(|e| map_language_error(e, to, source))?;

        let entry = decode::<Vec<TranslateEntry>>(raw, "translate")?
            .into_iter()
            .next()
            .ok_or_else(|| TranslateError::Transport("empty translate response".to_string()))?;
        let translated = entry
            .translations
            .into_iter()
            .next()
            .ok_or_else(|| TranslateError::Transport("translate response had no translations".to_string()))?;

        let detected = entry.detected_language.map(|d| LanguageCode::new(d.language));
        Ok(Translation::new(
            translated.text,
            translated.to,
            detected.or_else(|| source.cloned()),
        ))
    }

    async fn close(&self) -> Result<()> {
        if self.lifecycle.close() {
            info!("azure: provider closed");
        }
        Ok(())
    }
}
