//! Provider registry: owns providers and indexes the languages they serve.
//!
//! The language index is built incrementally when a provider is added and is
//! never touched otherwise, so lookups stay a map access no matter how many
//! translations run.

use crate::error::{Result, TranslateError};
use crate::language::{fold, CaseInsensitiveMap, LanguageCode, LanguageNames};
use crate::provider::Provider;
use futures::future::join_all;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Language code → folded names of the providers supporting it, in registration order.
pub type LanguageIndex = CaseInsensitiveMap<Vec<String>>;

struct Entry {
    key: String,
    provider: Arc<dyn Provider>,
    closed: bool,
}

#[derive(Default)]
struct State {
    providers: Vec<Entry>,
    languages: LanguageIndex,
    language_names: LanguageNames,
}

impl State {
    fn entry(&self, name: &str) -> Option<&Entry> {
        let key = fold(name);
        self.providers.iter().find(|entry| entry.key == key)
    }
}

/// Holds every provider and answers "which provider serves language X".
pub struct Registry {
    /// Serialises `add_provider` and `close` across their await points
    registration: Mutex<()>,
    state: RwLock<State>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            registration: Mutex::new(()),
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a provider and index the languages it reports.
    ///
    /// Fails with `DuplicateProvider` if a provider with the same
    /// case-insensitive name is registered. If fetching the provider's
    /// languages fails, the registry is left untouched. For a language code
    /// already known, the display name of the provider added first is kept.
    pub async fn add_provider(&self, provider: Box<dyn Provider>) -> Result<()> {
        let _registration = self.registration.lock().await;

        let name = provider.name().to_string();
        let key = fold(&name);
        if self.read().entry(&key).is_some() {
            return Err(TranslateError::DuplicateProvider(name));
        }

        let languages = provider.get_languages(None).await?;

        let mut guard = self.write();
        let state = &mut *guard;
        for (code, display_name) in &languages {
            let supporters = state.languages.get_or_insert_with(code, Vec::new);
            if !supporters.contains(&key) {
                supporters.push(key.clone());
            }
            if !state.language_names.contains_key(code) {
                state.language_names.insert(code, display_name.clone());
            }
        }
        state.providers.push(Entry {
            key,
            provider: Arc::from(provider),
            closed: false,
        });

        info!("Added provider '{}' supporting {} languages", name, languages.len());
        Ok(())
    }

    /// Add providers strictly in order. The first failure stops the remaining
    /// additions; providers added before it stay registered.
    pub async fn add_providers<I>(&self, providers: I) -> Result<()>
    where
        I: IntoIterator<Item = Box<dyn Provider>>,
    {
        for provider in providers {
            self.add_provider(provider).await?;
        }
        Ok(())
    }

    /// Pick a provider for `language`.
    ///
    /// An empty registry fails with `NoProviders` before the language is
    /// considered. `preferred` wins when it supports the language; otherwise
    /// the first-registered supporting provider is returned.
    pub fn provider_for(&self, language: &str, preferred: Option<&str>) -> Result<Arc<dyn Provider>> {
        let state = self.read();
        if state.providers.is_empty() {
            return Err(TranslateError::NoProviders);
        }

        let supporters = state
            .languages
            .get(language)
            .filter(|names| !names.is_empty())
            .ok_or_else(|| TranslateError::unsupported_target(language))?;

        let chosen = match preferred.map(fold) {
            Some(preferred) if supporters.contains(&preferred) => preferred,
            Some(preferred) => {
                debug!(
                    "Preferred provider '{}' does not support '{}', using '{}'",
                    preferred, language, supporters[0]
                );
                supporters[0].clone()
            }
            None => supporters[0].clone(),
        };

        state
            .entry(&chosen)
            .map(|entry| Arc::clone(&entry.provider))
            .ok_or_else(|| TranslateError::unsupported_target(language))
    }

    /// Look up a registered provider by case-insensitive name.
    pub fn provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.read().entry(name).map(|entry| Arc::clone(&entry.provider))
    }

    /// Names of registered providers, in registration order.
    pub fn providers(&self) -> Vec<String> {
        self.read()
            .providers
            .iter()
            .map(|entry| entry.provider.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().providers.is_empty()
    }

    /// Snapshot of the language index.
    pub fn languages(&self) -> LanguageIndex {
        self.read().languages.clone()
    }

    /// Snapshot of language display names (first-registered name per code).
    pub fn language_names(&self) -> LanguageNames {
        self.read().language_names.clone()
    }

    /// Reverse lookup: the code whose display name matches `name`, ignoring case.
    pub fn language_by_name(&self, name: &str) -> Option<LanguageCode> {
        let wanted = fold(name);
        self.read()
            .language_names
            .iter()
            .find(|(_, display)| fold(display) == wanted)
            .map(|(code, _)| LanguageCode::new(code))
    }

    /// Close every provider that has not been closed yet.
    ///
    /// Failures are collected and reported together; one failing provider
    /// does not stop the others from closing. Calling this again only closes
    /// providers added since the previous call.
    pub async fn close(&self) -> Result<()> {
        let _registration = self.registration.lock().await;

        let pending: Vec<(String, Arc<dyn Provider>)> = self
            .write()
            .providers
            .iter_mut()
            .filter(|entry| !entry.closed)
            .map(|entry| {
                entry.closed = true;
                (entry.provider.name().to_string(), Arc::clone(&entry.provider))
            })
            .collect();

        if pending.is_empty() {
            debug!("Registry close: nothing left to close");
            return Ok(());
        }

        let results = join_all(pending.iter().map(|(name, provider)| async move {
            (name.clone(), provider.close().await)
        }))
        .await;

        let errors: Vec<(String, TranslateError)> = results
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|e| (name, e)))
            .collect();

        for (name, error) in &errors {
            warn!("Failed to close provider '{}': {}", name, error);
        }
        info!(
            "Closed {} provider(s), {} failed",
            pending.len(),
            errors.len()
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TranslateError::Close(errors))
        }
    }
}
