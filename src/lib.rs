//! One async interface over several machine-translation services.
//!
//! Providers are added to a [`Registry`], which indexes the languages each
//! one supports. A [`Translator`] picks a provider per request and refuses
//! requests whose content is already in the target language. Providers with
//! several credentials run their requests through a [`RequestEngine`] that
//! retries transient failures and rotates credentials on quota exhaustion.

pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod language;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod retry;
pub mod translator;

pub use credentials::CredentialPool;
pub use engine::RequestEngine;
pub use error::{LanguageDirection, Result, TranslateError, UpstreamError};
pub use language::{CaseInsensitiveMap, LanguageCode, LanguageNames};
pub use provider::{ProfanityFilter, Provider, TranslateOptions, Translation};
pub use registry::Registry;
pub use retry::RetryConfig;
pub use translator::{TranslateRequest, Translator};
