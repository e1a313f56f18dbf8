use super::{decode, DEFAULT_TIMEOUT, DEFAULT_TRANSIENT_STATUSES};
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

pub const GOOGLE_ENDPOINT: &str = "https://translation.googleapis.com/";
const NAME: &str = "google";

#[derive(Debug, Deserialize)]
struct SupportedLanguages {
    #[serde(default)]
    languages: Vec<SupportedLanguage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SupportedLanguage {
    language_code: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    support_source: bool,
    #[serde(default)]
    support_target: bool,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    languages: Vec<DetectedLanguage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectedLanguage {
    language_code: String,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    translations: Vec<GoogleTranslation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTranslation {
    translated_text: String,
    #[serde(default)]
    detected_language_code: Option<String>,
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

/// Google Cloud Translation (v3 REST API).
///
/// `parent` is the project/location path, e.g.
/// `projects/my-project/locations/global`. Credentials are OAuth access
/// tokens sent as bearer tokens.
pub struct Google {
    client: reqwest::Client,
    endpoint: String,
    parent: String,
    engine: RequestEngine,
    transient_statuses: Vec<u16>,
    lifecycle: Lifecycle,
}

impl Google {
    pub fn new<I, S>(parent: impl Into<String>, access_tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parent = parent.into().trim_matches('/').to_string();
        if parent.is_empty() {
            return Err(TranslateError::NoCredentials(NAME.to_string()));
        }
        let pool = CredentialPool::new(NAME, access_tokens)?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: GOOGLE_ENDPOINT.to_string(),
            parent,
            engine: RequestEngine::new(NAME, pool).with_timeout(DEFAULT_TIMEOUT),
            transient_statuses: DEFAULT_TRANSIENT_STATUSES.to_vec(),
            lifecycle: Lifecycle::default(),
        })
    }

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
        action: &str,
        params: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        self.lifecycle.ensure_open(NAME)?;
        let url = format!("{}v3/{}{}", self.endpoint, self.parent, action);
        let statuses = self.transient_statuses.as_slice();

        self.engine
            .execute(operation, |token| {
                let mut request = self
                    .client
                    .request(method.clone(), &url)
                    .query(params)
                    .bearer_auth(token);
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

fn classify(body: ResponseBody, transient_statuses: &[u16]) -> std::result::Result<serde_json::Value, Failure> {
    if body.is_success() {
        return body.into_json();
    }

    let error = body
        .json
        .as_ref()
        .and_then(|json| serde_json::from_value::<ErrorEnvelope>(json.clone()).ok())
        .map(|envelope| UpstreamError::new(Some(body.status), Some(envelope.error.code), envelope.error.message))
        .unwrap_or_else(|| UpstreamError::new(Some(body.status), None, body.text.clone()));

    match body.status {
        // RESOURCE_EXHAUSTED: back off first, then give the next token a go
        429 => Err(Failure::Transient { error, quota: true }),
        status if transient_statuses.contains(&status) => Err(Failure::transient(error)),
        401 | 403 => Err(Failure::QuotaExhausted(error)),
        _ if body.json.is_none() => Err(Failure::Fatal(TranslateError::Transport(body.text))),
        _ => Err(Failure::Fatal(TranslateError::UpstreamRequest(error))),
    }
}

/// Google reports invalid languages as INVALID_ARGUMENT with a descriptive message.
fn map_language_error(err: TranslateError, to: &LanguageCode, source: Option<&LanguageCode>) -> TranslateError {
    let message = match &err {
        TranslateError::UpstreamRequest(UpstreamError { status: Some(400), message, .. }) => message.to_lowercase(),
        _ => return err,
    };
    if message.contains("source language") {
        TranslateError::unsupported_source(source.map(|s| s.to_string()).unwrap_or_default())
    } else if message.contains("target language") {
        TranslateError::unsupported_target(to.to_string())
    } else {
        err
    }
}

#[async_trait]
impl Provider for Google {
    fn name(&self) -> &str {
        NAME
    }

    async fn get_languages(&self, locale: Option<&str>) -> Result<LanguageNames> {
        let display = locale.unwrap_or("en");
        let raw = self
            .request(
                "languages",
                Method::GET,
                "/supportedLanguages",
                &[("displayLanguageCode", display)],
                None,
            )
            .await?;
        let response: SupportedLanguages = decode(raw, "supportedLanguages")?;
        self.lifecycle.mark_ready();

        let languages: LanguageNames = response
            .languages
            .into_iter()
            .filter(|lang| lang.support_source && lang.support_target)
            .map(|lang| {
                let name = lang.display_name.unwrap_or_else(|| lang.language_code.clone());
                (lang.language_code, name)
            })
            .collect();
        debug!("google: {} languages usable as source and target", languages.len());
        Ok(languages)
    }

    async fn detect(&self, text: &str) -> Result<LanguageCode> {
        let raw = self
            .request(
                "detect",
                Method::POST,
                ":detectLanguage",
                &[],
                Some(serde_json::json!({ "content": text, "mimeType": "text/plain" })),
            )
            .await?;
        let response: DetectResponse = decode(raw, "detectLanguage")?;
        response
            .languages
            .into_iter()
            .next()
            .map(|lang| LanguageCode::new(lang.language_code))
            .ok_or_else(|| TranslateError::Transport("detectLanguage returned no languages".to_string()))
    }

    async fn translate(
        &self,
        text: &str,
        to: &LanguageCode,
        source: Option<&LanguageCode>,
        options: &TranslateOptions,
    ) -> Result<Translation> {
        let mut body = serde_json::json!({
            "contents": [text],
            "targetLanguageCode": to.as_str(),
            "mimeType": "text/plain",
        });
        if let Some(source) = source {
            body["sourceLanguageCode"] = serde_json::Value::from(source.as_str());
        }
        for (key, value) in &options.extra {
            body[key.as_str()] = serde_json::Value::from(value.as_str());
        }

        let raw = self
            .request("translate", Method::POST, ":translateText", &[], Some(body))
            .await
            .map_err(|e| map_language_error(e, to, source))?;

        let response: TranslateResponse = decode(raw, "translateText")?;
        let translation = response
            .translations
            .into_iter()
            .next()
            .ok_or_else(|| TranslateError::Transport("translateText returned no translations".to_string()))?;

        let detected = translation
            .detected_language_code
            .filter(|code| !code.is_empty())
            .map(LanguageCode::new);
        Ok(Translation::new(
            translation.translated_text,
            to.clone(),
            detected.or_else(|| source.cloned()),
        ))
    }

    async fn close(&self) -> Result<()> {
        if self.lifecycle.close() {
            info!("google: provider closed");
        }
        Ok(())
    }
}
