//! ---
//! nmea_section: "01-core-functionality"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Tracing bootstrap for the bridge daemon and the command line tools."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
use std::io::Write;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "NMEA_BRIDGE_LOG";
const DAEMON_DEFAULT: &str = "info";

/// Writer guards for the daemon's stdout and sentence-log file.
static GUARDS: OnceCell<[WorkerGuard; 2]> = OnceCell::new();

/// Stdout rendering for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Filter from `NMEA_BRIDGE_LOG`, then `RUST_LOG`, then `fallback`.
///
/// A malformed bridge directive is reported on stderr and replaced by
/// `fallback`.
fn resolve_filter(bridge_directive: Option<String>, fallback: &str) -> EnvFilter {
    match bridge_directive {
        Some(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            let _ = writeln!(
                std::io::stderr(),
                "ignoring {LOG_ENV}={directive:?} ({err}); using '{fallback}'"
            );
            EnvFilter::new(fallback)
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
    }
}

fn stdout_layer<S>(format: LogFormat, writer: NonBlocking) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let base = fmt::layer().with_timer(UtcTime::rfc_3339()).with_writer(writer);
    match format {
        LogFormat::StructuredJson => base.with_target(false).json().boxed(),
        LogFormat::Pretty => base.with_target(true).boxed(),
    }
}

/// Install the daemon subscriber: stdout in the configured format plus a
/// daily-rotated JSON file `<prefix>.log` under `config.directory`.
///
/// Per-sentence drops log at `debug`, so the default `info` filter keeps a
/// busy feed quiet. Calling this twice keeps the first subscriber.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("unable to create log directory {}", config.directory.display())
    })?;
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, format!("{prefix}.log")));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = GUARDS.set([stdout_guard, file_guard]);

    let file_layer = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_target(true)
        .json()
        .with_writer(file_writer);

    let installed = tracing_subscriber::registry()
        .with(resolve_filter(std::env::var(LOG_ENV).ok(), DAEMON_DEFAULT))
        .with(stdout_layer(config.format, stdout_writer))
        .with(file_layer)
        .try_init()
        .is_ok();

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        installed,
        "tracing initialised"
    );
    Ok(())
}

/// Stderr-only subscriber for `nmea-simgen` and `nmea-bridged validate`;
/// stdout stays reserved for rendered sentences and reports.
pub fn init_cli_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(resolve_filter(std::env::var(LOG_ENV).ok(), fallback))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::Pretty,
            file_prefix: Some("test".into()),
        };
        init_tracing("nmea-test", &config).unwrap();
        assert!(config.directory.is_dir());
    }

    #[test]
    fn bridge_directive_is_used_verbatim() {
        let filter = resolve_filter(Some("nmea_net=trace".into()), "warn");
        assert_eq!(filter.to_string(), "nmea_net=trace");
    }

    #[test]
    fn malformed_directive_falls_back() {
        let filter = resolve_filter(Some("nmea_net=loud".into()), "warn");
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn log_format_uses_kebab_case() {
        let format: LogFormat = serde_json::from_str("\"structured-json\"").unwrap();
        assert_eq!(format, LogFormat::StructuredJson);
    }
}
