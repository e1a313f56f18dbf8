//! Command-line front end for the configured translation providers
//!
//! Usage:
//!   translate-hub translate <TO> [--from <LANG>] [--prefer <PROVIDER>] [--profanity <0|1|2>] <TEXT...>
//!   translate-hub detect <TEXT...>
//!   translate-hub languages

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use translate_hub::config::Config;
use translate_hub::provider::{ProfanityFilter, TranslateOptions};
use translate_hub::registry::Registry;
use translate_hub::translator::{TranslateRequest, Translator};

fn print_usage() {
    println!(
        r#"
Translate text through whichever providers are configured

USAGE:
    translate-hub <COMMAND>

COMMANDS:
    translate <TO> [--from <LANG>] [--prefer <PROVIDER>] [--profanity <0|1|2>] <TEXT...>
    detect <TEXT...>
    languages

ENVIRONMENT VARIABLES:
    AZURE_TRANSLATE_KEYS          Comma-separated Azure subscription keys
    AZURE_TRANSLATE_ENDPOINT      Azure endpoint override
    DEEPL_AUTH_KEYS               Comma-separated DeepL keys (":fx" keys use the free API)
    GOOGLE_TRANSLATE_PARENT       projects/<id>/locations/<location>
    GOOGLE_ACCESS_TOKENS          Comma-separated OAuth access tokens
    TRANSLATE_TIMEOUT_SECS        Per-request timeout (default: 30)
    TRANSLATE_DETECTION_PROVIDER  Provider used for language detection
    TRANSLATE_PREFERRED_PROVIDER  Provider preferred when several support a language
"#
    );
}

struct TranslateArgs {
    to: String,
    from: Option<String>,
    prefer: Option<String>,
    options: TranslateOptions,
    text: String,
}

fn parse_translate_args(args: &[String]) -> Result<TranslateArgs> {
    let mut iter = args.iter();
    let to = iter.next().context("Missing target language")?.clone();
    let mut from = None;
    let mut prefer = None;
    let mut options = TranslateOptions::default();
    let mut words = Vec::new();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--from" => from = Some(iter.next().context("--from needs a language")?.clone()),
            "--prefer" => prefer = Some(iter.next().context("--prefer needs a provider name")?.clone()),
            "--profanity" => {
                let level = iter
                    .next()
                    .and_then(|v| v.parse().ok())
                    .and_then(ProfanityFilter::from_level)
                    .context("--profanity needs a level of 0, 1 or 2")?;
                options = options.with_profanity_filter(level);
            }
            _ => words.push(arg.as_str()),
        }
    }

    if words.is_empty() {
        bail!("Missing text to translate");
    }
    Ok(TranslateArgs {
        to,
        from,
        prefer,
        options,
        text: words.join(" "),
    })
}

async fn run(command: &str, args: &[String], config: &Config, translator: &Translator) -> Result<()> {
    match command {
        "translate" => {
            let args = parse_translate_args(args)?;
            let mut request =
                TranslateRequest::new(&args.text, args.to.as_str()).options(args.options.clone());
            if let Some(from) = &args.from {
                request = request.from(from.as_str());
            }
            if let Some(prefer) = args.prefer.as_deref().or(config.preferred_provider.as_deref()) {
                request = request.prefer(prefer);
            }

            let translation = translator.translate(request).await?;
            match translation.source() {
                Some(source) => info!("Translated {} -> {}", source, translation.to()),
                None => info!("Translated to {}", translation.to()),
            }
            println!("{}", translation.text());
        }
        "detect" => {
            if args.is_empty() {
                bail!("Missing text to detect");
            }
            let language = translator.detect(&args.join(" "), None).await?;
            println!("{}", language);
        }
        "languages" => {
            let languages = translator.registry().languages();
            let names = translator.registry().language_names();
            for (code, providers) in &languages {
                let name = names.get(code).map(String::as_str).unwrap_or("");
                println!("{:<10} {:<30} {}", code, name, providers.join(", "));
            }
        }
        _ => {
            print_usage();
            bail!("Unknown command: {}", command);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when variables come from the environment)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translate_hub=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || matches!(args[1].as_str(), "--help" | "-h" | "help") {
        print_usage();
        return Ok(());
    }

    let config = Config::from_env()?;

    let registry = Arc::new(Registry::new());
    registry
        .add_providers(config.build_providers()?)
        .await
        .context("Failed to register providers")?;
    info!("Registered providers: {}", registry.providers().join(", "));

    let mut translator = Translator::new(Arc::clone(&registry));
    if let Some(detector) = &config.detection_provider {
        translator = translator.with_detector(detector.clone());
    }

    let result = run(&args[1], &args[2..], &config, &translator).await;

    if let Err(e) = registry.close().await {
        warn!("{}", e);
    }
    result
}
