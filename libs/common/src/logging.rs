//! Unified logging module for VoltageEMS RTU tools
//!
//! Installs a single console subscriber that writes to stderr, leaving stdout
//! free for JSON output produced by the tools.

use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::{
    fmt::{
        self,
        format::Writer,
        FmtContext, FormatEvent, FormatFields,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Custom event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809Z [INFO] slave 17 responded`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Filter string the subscriber was installed with (write-once)
static ACTIVE_FILTER: OnceLock<String> = OnceLock::new();

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Tool name, filtered at the console level when `RUST_LOG` is unset (e.g. "rtuctl")
    pub service_name: String,
    /// Console log level
    pub console_level: Level,
    /// Colorize level tags
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "rtuctl".to_string(),
            console_level: Level::INFO,
            ansi: true,
        }
    }
}

/// Build the filter directive string
///
/// `RUST_LOG` wins when set; otherwise the console level applies globally and
/// the frame-level tracing of `voltage_rtu` follows the same level.
pub fn filter_directive(config: &LogConfig, rust_log: Option<&str>) -> String {
    match rust_log {
        Some(env_str) if !env_str.trim().is_empty() => env_str.to_string(),
        _ => format!(
            "{},{}={},voltage_rtu={}",
            config.console_level.as_str().to_lowercase(),
            config.service_name,
            config.console_level.as_str().to_lowercase(),
            config.console_level.as_str().to_lowercase()
        ),
    }
}

/// Initialize logging system with configuration
///
/// Safe to call more than once: only the first call installs a subscriber.
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    if ACTIVE_FILTER.get().is_some() {
        return Ok(());
    }

    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(&config, rust_log.as_deref());
    let env_filter = EnvFilter::try_new(&directive)?;

    let console_layer = fmt::layer()
        .event_format(BracketedLevelFormat)
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init()?;

    let _ = ACTIVE_FILTER.set(directive);
    Ok(())
}

/// Init with a level string ("trace", "debug", "info", "warn", "error")
pub fn init(level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = LogConfig {
        console_level: level.parse().unwrap_or(Level::INFO),
        ..Default::default()
    };
    init_with_config(config)
}

/// Get the installed filter string
pub fn get_log_level() -> String {
    ACTIVE_FILTER
        .get()
        .cloned()
        .unwrap_or_else(|| "unknown".to_string())
}
