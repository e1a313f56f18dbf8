//! Upstream integrations.
//!
//! - `azure`: Microsoft Translator v3, multiple subscription keys with rotation
//! - `google`: Cloud Translation v3 REST, bearer tokens with rotation
//! - `deepl`: DeepL v2, free/pro endpoint chosen per key, no detection

mod azure;
mod deepl;
mod google;

pub use azure::{Azure, AZURE_ENDPOINT};
pub use deepl::{DeepL, DEEPL_FREE_ENDPOINT, DEEPL_PRO_ENDPOINT};
pub use google::{Google, GOOGLE_ENDPOINT};

use crate::error::{Result, TranslateError};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Per-attempt timeout used unless a provider is configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Statuses retried with backoff against the same credential.
pub const DEFAULT_TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Decode a successful JSON body into a typed response.
fn decode<T: DeserializeOwned>(value: serde_json::Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| TranslateError::Transport(format!("unexpected {} response: {}", what, e)))
}
