use dotenvy::dotenv;
use postpilot_core::config::AgentSettings;
use postpilot_transport_telegram::config::{BotSettings, TelegramSettings};
use postpilot_transport_telegram::runner::run_bot;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Secrets masked before any log line reaches stderr, as (pattern, replacement)
const REDACTIONS: &[(&str, &str)] = &[
    // Telegram token inside API URLs and bare
    (
        r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)",
        "${1}[TELEGRAM_TOKEN]",
    ),
    (r"\b[0-9]{8,10}:[A-Za-z0-9_-]{35}\b", "[TELEGRAM_TOKEN]"),
    // OpenAI-style keys
    (r"\bsk-[A-Za-z0-9_-]{16,}", "[OPENAI_KEY]"),
    // Replicate tokens
    (r"\br8_[A-Za-z0-9]{20,}", "[REPLICATE_TOKEN]"),
    // Bearer tokens (Google Drive, Replicate)
    (r"(?i)(bearer\s+)[A-Za-z0-9._~+/=-]+", "${1}[MASKED]"),
    // imageBB key in query strings
    (r"([?&]key=)[^\s&]+", "${1}[MASKED]"),
    (
        r"(IMAGEBB_API_KEY|REPLICATE_API_TOKEN|GOOGLE_DRIVE_ACCESS_TOKEN|OPENAI_API_KEY)=[^\s&]+",
        "${1}=[MASKED]",
    ),
    (
        r"(R2_ACCESS_KEY_ID|R2_SECRET_ACCESS_KEY)=[^\s&]+",
        "${1}=[MASKED]",
    ),
    (
        r"'(aws_access_key_id|aws_secret_access_key)': '[^']*'",
        "'${1}': '[MASKED]'",
    ),
];

/// Compiled redaction table
struct RedactionPatterns {
    rules: Vec<(Regex, &'static str)>,
}

impl RedactionPatterns {
    /// Compile every pattern in [`REDACTIONS`]
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        let rules = REDACTIONS
            .iter()
            .map(|(pattern, replacement)| Regex::new(pattern).map(|re| (re, *replacement)))
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    fn redact(&self, input: &str) -> String {
        self.rules
            .iter()
            .fold(input.to_string(), |text, (re, replacement)| {
                re.replace_all(&text, *replacement).into_owned()
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
        // The caller's byte count is reported even when redaction changed the length.
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
            patterns: Arc::clone(&self.patterns),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);
    init_logging(patterns);

    info!("Starting Postpilot Telegram bot...");
    let settings = init_settings();

    if let Err(e) = run_bot(settings).await {
        error!("Bot stopped with error: {e:#}");
        std::process::exit(1);
    }
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

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug_mode {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(
                "postpilot_core=info,postpilot_transport_telegram=info,postpilot_telegram_bot=info,hyper=warn,h2=error,reqwest=warn,tokio=warn,async_openai=warn,aws_config=warn",
            )
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<BotSettings> {
    let agent_settings = match AgentSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load agent configuration: {}", e);
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

    info!(
        model = %agent_settings.openai_model,
        whitelist = telegram_settings.allowed_users().len(),
        "Configuration loaded successfully."
    );
    Arc::new(BotSettings::new(agent_settings, telegram_settings))
}
