use dotenvy::dotenv;
use pastpaper_core::config::ScraperSettings;
use pastpaper_transport_telegram::config::{BotSettings, TelegramSettings};
use pastpaper_transport_telegram::runner::run_bot;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str =
    "pastpaper_core=info,pastpaper_transport_telegram=info,reqwest=warn,hyper=warn,h2=error,teloxide=warn";

/// Bot token patterns masked in log output
struct RedactionPatterns {
    rules: Vec<(Regex, &'static str)>,
}

impl RedactionPatterns {
    /// Compile the token patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            rules: vec![
                // API URLs: https://api.telegram.org/bot<token>/method
                (
                    Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
                    "$1[TELEGRAM_TOKEN]$3",
                ),
                (
                    Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
                    "$1[TELEGRAM_TOKEN]",
                ),
                (
                    Regex::new(r"[0-9]{8,10}:[A-Za-z0-9_-]{35}")?,
                    "[TELEGRAM_TOKEN]",
                ),
            ],
        })
    }

    fn redact(&self, input: &str) -> String {
        self.rules
            .iter()
            .fold(input.to_string(), |acc, (re, replacement)| {
                re.replace_all(&acc, *replacement).into_owned()
            })
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let redacted = self.patterns.redact(&String::from_utf8_lossy(buf));
        self.inner.write_all(redacted.as_bytes())?;
        // The whole input was consumed even if the redacted text is shorter
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            patterns: self.patterns.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Patterns must exist before the first log line
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting past paper bot...");

    let settings = init_settings();

    run_bot(settings).await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        patterns,
    };

    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);
    let default_filter = if debug_mode { "debug" } else { DEFAULT_LOG_FILTER };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<BotSettings> {
    let scraper_settings = match ScraperSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load scraper configuration: {}", e);
            std::process::exit(1);
        }
    };
    let telegram_settings = match TelegramSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load telegram configuration: {}", e);
            std::process::exit(1);
        }
    };

    if telegram_settings.telegram_token.is_empty() {
        error!("TELEGRAM_TOKEN is not set");
        std::process::exit(1);
    }

    info!("Configuration loaded successfully.");
    Arc::new(BotSettings::new(scraper_settings, telegram_settings))
}
