use crate::provider::Provider;
use crate::providers::{Azure, DeepL, Google, AZURE_ENDPOINT};
use anyhow::{bail, Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// `projects/<id>/locations/<location>`
    pub parent: String,
    pub access_tokens: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Azure
    pub azure_keys: Vec<String>,
    pub azure_endpoint: String,

    // DeepL
    pub deepl_keys: Vec<String>,

    // Google
    pub google: Option<GoogleConfig>,

    // Dispatch
    pub timeout: Duration,
    pub detection_provider: Option<String>,
    pub preferred_provider: Option<String>,
}

/// Split a comma-separated list, dropping blank entries.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn list_var(name: &str) -> Vec<String> {
    std::env::var(name).map(|v| parse_list(&v)).unwrap_or_default()
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let google = match optional_var("GOOGLE_TRANSLATE_PARENT") {
            Some(parent) => {
                let access_tokens = list_var("GOOGLE_ACCESS_TOKENS");
                if access_tokens.is_empty() {
                    bail!("GOOGLE_ACCESS_TOKENS not set (required with GOOGLE_TRANSLATE_PARENT)");
                }
                Some(GoogleConfig {
                    parent,
                    access_tokens,
                })
            }
            None => None,
        };

        Ok(Self {
            // Azure
            azure_keys: list_var("AZURE_TRANSLATE_KEYS"),
            azure_endpoint: optional_var("AZURE_TRANSLATE_ENDPOINT")
                .unwrap_or_else(|| AZURE_ENDPOINT.to_string()),

            // DeepL
            deepl_keys: list_var("DEEPL_AUTH_KEYS"),

            // Google
            google,

            // Dispatch
            timeout: Duration::from_secs(
                std::env::var("TRANSLATE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            detection_provider: optional_var("TRANSLATE_DETECTION_PROVIDER"),
            preferred_provider: optional_var("TRANSLATE_PREFERRED_PROVIDER"),
        })
    }

    /// Construct every configured provider, in the order azure, google, deepl.
    pub fn build_providers(&self) -> Result<Vec<Box<dyn Provider>>> {
        let mut providers: Vec<Box<dyn Provider>> = Vec::new();

        if !self.azure_keys.is_empty() {
            let azure = Azure::new(self.azure_keys.iter().cloned())
                .context("Failed to configure Azure")?
                .with_endpoint(self.azure_endpoint.clone())
                .with_timeout(self.timeout);
            providers.push(Box::new(azure));
        }

        if let Some(google) = &self.google {
            let google = Google::new(google.parent.clone(), google.access_tokens.iter().cloned())
                .context("Failed to configure Google")?
                .with_timeout(self.timeout);
            providers.push(Box::new(google));
        }

        if !self.deepl_keys.is_empty() {
            let deepl = DeepL::new(self.deepl_keys.iter().cloned())
                .context("Failed to configure DeepL")?
                .with_timeout(self.timeout);
            providers.push(Box::new(deepl));
        }

        if providers.is_empty() {
            bail!("No translation provider configured (set AZURE_TRANSLATE_KEYS, DEEPL_AUTH_KEYS or GOOGLE_TRANSLATE_PARENT)");
        }
        Ok(providers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 8] = [
        "AZURE_TRANSLATE_KEYS",
        "AZURE_TRANSLATE_ENDPOINT",
        "DEEPL_AUTH_KEYS",
        "GOOGLE_TRANSLATE_PARENT",
        "GOOGLE_ACCESS_TOKENS",
        "TRANSLATE_TIMEOUT_SECS",
        "TRANSLATE_DETECTION_PROVIDER",
        "TRANSLATE_PREFERRED_PROVIDER",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_parse_list_trims_and_drops_blanks() {
        assert_eq!(parse_list(" a, b ,,c ,"), vec!["a", "b", "c"]);
        assert!(parse_list(" , ").is_empty());
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        std::env::set_var("AZURE_TRANSLATE_KEYS", "k1,k2");

        let config = Config::from_env().unwrap();
        assert_eq!(config.azure_keys, vec!["k1", "k2"]);
        assert_eq!(config.azure_endpoint, AZURE_ENDPOINT);
        assert!(config.deepl_keys.is_empty());
        assert!(config.google.is_none());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.detection_provider, None);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_timeout_falls_back_to_default() {
        clear_env();
        std::env::set_var("TRANSLATE_TIMEOUT_SECS", "soon");
        assert_eq!(Config::from_env().unwrap().timeout, Duration::from_secs(30));

        std::env::set_var("TRANSLATE_TIMEOUT_SECS", "5");
        assert_eq!(Config::from_env().unwrap().timeout, Duration::from_secs(5));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_google_parent_requires_tokens() {
        clear_env();
        std::env::set_var("GOOGLE_TRANSLATE_PARENT", "projects/demo/locations/global");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("GOOGLE_ACCESS_TOKENS"));

        std::env::set_var("GOOGLE_ACCESS_TOKENS", "t1");
        let google = Config::from_env().unwrap().google.unwrap();
        assert_eq!(google.parent, "projects/demo/locations/global");
        assert_eq!(google.access_tokens, vec!["t1"]);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_build_providers_in_fixed_order() {
        clear_env();
        std::env::set_var("DEEPL_AUTH_KEYS", "d:fx");
        std::env::set_var("AZURE_TRANSLATE_KEYS", "a");
        std::env::set_var("GOOGLE_TRANSLATE_PARENT", "projects/demo/locations/global");
        std::env::set_var("GOOGLE_ACCESS_TOKENS", "t");
        std::env::set_var("TRANSLATE_DETECTION_PROVIDER", " azure ");

        let config = Config::from_env().unwrap();
        let names: Vec<String> = config
            .build_providers()
            .unwrap()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["azure", "google", "deepl"]);
        assert_eq!(config.detection_provider.as_deref(), Some("azure"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_no_providers_configured_is_an_error() {
        clear_env();
        let config = Config::from_env().unwrap();
        let err = config.build_providers().err().unwrap();
        assert!(err.to_string().contains("No translation provider configured"));
    }
}
