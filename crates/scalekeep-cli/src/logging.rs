//! Log output: stderr, a rotated file, or both.
//!
//! ```toml
//! [logging]
//! level = "info,scalekeep_state=debug"
//! format = "json"
//! file = "logs/scalekeep.log"
//! rotation = "daily"
//! console = false
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use scalekeep_core::config::LoggingConfig;

const LOG_ENV: &str = "SCALEKEEP_LOG";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; hold it until exit.
pub fn init(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let directive = std::env::var(LOG_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_new(directive)?;

    let json = match logging.format.as_deref() {
        None | Some("text") => false,
        Some("json") => true,
        Some(other) => bail!("unknown log format {other:?}, expected \"text\" or \"json\""),
    };

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if logging.console() {
        layers.push(format_layer(json, std::io::stderr, true));
    }

    let mut guard = None;
    if let Some(path) = &logging.file {
        let appender = file_appender(path, logging.rotation.as_deref())?;
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(format_layer(json, writer, false));
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;
    Ok(guard)
}

fn format_layer<W>(json: bool, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

fn parse_rotation(raw: Option<&str>) -> Result<Rotation> {
    Ok(match raw.unwrap_or("daily") {
        "daily" => Rotation::DAILY,
        "hourly" => Rotation::HOURLY,
        "minutely" => Rotation::MINUTELY,
        "never" => Rotation::NEVER,
        other => bail!(
            "unknown log rotation {other:?}, expected \"daily\", \"hourly\", \"minutely\" or \"never\""
        ),
    })
}

/// Appender writing `path`, with the rotation suffix appended to its name.
fn file_appender(path: &Path, rotation: Option<&str>) -> Result<RollingFileAppender> {
    let rotation = parse_rotation(rotation)?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let prefix = path
        .file_name()
        .with_context(|| format!("log file {} has no file name", path.display()))?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(prefix.to_string_lossy())
        .build(dir)
        .with_context(|| format!("failed to open log file {}", path.display()))
}
