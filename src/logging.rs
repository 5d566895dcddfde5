/// Logging configuration.
///
/// Logs land in `<data_dir>/logs/bot.log`; each process start appends a
/// separator line so sessions stay distinguishable in the shared file.
use anyhow::{Context, Result};
use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes logging for the bot process.
///
/// Default level is INFO; override via the RUST_LOG env var.
pub fn init_logging(data_dir: &Path) -> Result<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "bot.log");

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .ok(); // Already-initialized is fine in tests.

    let separator = format!(
        "\n{sep}\n[{ts}] New command session\n{sep}\n",
        sep = "=".repeat(80),
        ts = chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
    );

    use std::io::Write;
    if let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("bot.log"))
    {
        let _ = writeln!(file, "{}", separator);
    }

    tracing::info!("logging initialized at {}", log_dir.display());
    Ok(())
}
