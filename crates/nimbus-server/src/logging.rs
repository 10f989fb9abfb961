//! File-based logging with per-component files
//!
//! | Log File        | Component                         | Target Prefixes   |
//! |-----------------|-----------------------------------|-------------------|
//! | nimbus.log      | Root logger (all components)      | (all)             |
//! | reconcile.log   | Reconciliation engine and tasks   | nimbus_core       |
//! | plugin.log      | Provider backends                 | nimbus_plugin*    |
//!
//! Log files are stored in `~/nimbus/logs` by default.
//! Override with the `NIMBUS_LOG_DIR` environment variable.

use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::{Filter, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

struct ComponentLogDef {
    file_name: &'static str,
    targets: &'static [&'static str],
}

const ROOT_LOG: &str = "nimbus.log";

const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "reconcile.log",
        targets: &["nimbus_core"],
    },
    ComponentLogDef {
        file_name: "plugin.log",
        targets: &[
            "nimbus_plugin",
            "nimbus_plugin_openstack",
            "nimbus_plugin_openshift",
        ],
    },
];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub console_level: Level,
    pub file_logging: bool,
    pub file_level: Level,
}

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/nimbus/logs", home))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            console_level: Level::INFO,
            file_logging: true,
            file_level: Level::INFO,
        }
    }
}

impl LoggingConfig {
    /// Create from `NIMBUS_LOG_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_dir = lookup("NIMBUS_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_log_dir);

        let console_output = lookup("NIMBUS_LOG_CONSOLE")
            .map(|v| v.to_lowercase() != "false" && v != "0")
            .unwrap_or(true);

        let file_logging = lookup("NIMBUS_LOG_FILE")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(true);

        let console_level = lookup("NIMBUS_LOG_LEVEL")
            .and_then(|v| v.parse().ok())
            .unwrap_or(Level::INFO);

        Self {
            log_dir,
            console_output,
            console_level,
            file_logging,
            file_level: console_level,
        }
    }
}

/// Keeps the non-blocking file writers alive; dropping it flushes them
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

fn file_layer<F>(
    log_dir: &Path,
    file_name: &str,
    filter: F,
    guards: &mut Vec<WorkerGuard>,
) -> Box<dyn Layer<Registry> + Send + Sync>
where
    F: Filter<Registry> + Send + Sync + 'static,
{
    let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    guards.push(guard);
    Box::new(
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_filter(filter),
    )
}

/// Install the global subscriber
///
/// Console output goes to stderr so `--output json` on stdout stays parseable.
/// `RUST_LOG`, when set, overrides the configured level for the console and
/// root file; component files take every event from their targets.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.console_output {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.console_level.to_string()));
        layers.push(Box::new(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(filter),
        ));
    }

    if config.file_logging {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.file_level.to_string()));
        layers.push(file_layer(&config.log_dir, ROOT_LOG, filter, &mut guards));

        for component in COMPONENT_LOGS {
            let mut targets = Targets::new();
            for target in component.targets {
                targets = targets.with_target(*target, LevelFilter::TRACE);
            }
            layers.push(file_layer(
                &config.log_dir,
                component.file_name,
                targets,
                &mut guards,
            ));
        }
    }

    // try_init also installs the `log` bridge (tracing-subscriber's tracing-log feature)
    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            "File logging initialized: {} (root) + {} component log files",
            ROOT_LOG,
            COMPONENT_LOGS.len()
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = LoggingConfig::from_lookup(lookup(&[]));
        assert!(config.console_output);
        assert!(config.file_logging);
        assert_eq!(config.console_level, Level::INFO);
        assert!(config.log_dir.ends_with("nimbus/logs"));
    }

    #[test]
    fn test_env_overrides() {
        let config = LoggingConfig::from_lookup(lookup(&[
            ("NIMBUS_LOG_DIR", "/var/log/nimbus"),
            ("NIMBUS_LOG_CONSOLE", "0"),
            ("NIMBUS_LOG_FILE", "false"),
            ("NIMBUS_LOG_LEVEL", "debug"),
        ]));
        assert_eq!(config.log_dir, PathBuf::from("/var/log/nimbus"));
        assert!(!config.console_output);
        assert!(!config.file_logging);
        assert_eq!(config.file_level, Level::DEBUG);
    }

    #[test]
    fn test_component_targets_cover_backends() {
        let plugin = COMPONENT_LOGS
            .iter()
            .find(|c| c.file_name == "plugin.log")
            .unwrap();
        assert!(plugin.targets.contains(&"nimbus_plugin_openshift"));
    }
}
