// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::OnceCell;
use std::env;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Configuration for the tracing subscriber of a relayer process.
///
/// `RUST_LOG` overrides `log_level`, `RUST_LOG_JSON` switches to JSON output.
#[derive(Default, Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log directives, e.g. `info` or `relay_bridge=debug,info`.
    pub log_level: Option<String>,
    /// Emit logs as JSON lines.
    pub json_log_output: bool,
    /// Print file and line of the log site.
    pub log_file_and_line: bool,
}

/// Dropping the guard does not tear the subscriber down; it exists so callers
/// can keep the same binding shape as other telemetry setups.
#[must_use]
pub struct TelemetryGuards;

type ReloadHandle = reload::Handle<EnvFilter, Registry>;

/// Allows changing log directives at runtime.
#[derive(Clone, Debug)]
pub struct FilterHandle(ReloadHandle);

impl FilterHandle {
    pub fn update<S: AsRef<str>>(&self, directives: S) -> Result<(), String> {
        let filter = EnvFilter::try_new(directives.as_ref()).map_err(|e| e.to_string())?;
        self.0.reload(filter).map_err(|e| e.to_string())
    }

    pub fn get(&self) -> Result<String, String> {
        self.0
            .with_current(|filter| filter.to_string())
            .map_err(|e| e.to_string())
    }
}

impl TelemetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_level(mut self, log_level: &str) -> Self {
        self.log_level = Some(log_level.to_owned());
        self
    }

    pub fn with_json(mut self) -> Self {
        self.json_log_output = true;
        self
    }

    pub fn with_env(mut self) -> Self {
        if env::var("RUST_LOG_JSON").is_ok() {
            self.json_log_output = true;
        }
        if let Ok(level) = env::var("RUST_LOG") {
            self.log_level = Some(level);
        }
        if env::var("RUST_LOG_FILE_LINE").is_ok() {
            self.log_file_and_line = true;
        }
        self
    }

    fn env_filter(&self) -> EnvFilter {
        let directives = self.log_level.as_deref().unwrap_or("info");
        EnvFilter::try_new(directives).unwrap_or_else(|_| {
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .parse_lossy("")
        })
    }

    /// Installs the global subscriber. Panics if one is already installed,
    /// the same way `tracing_subscriber::init` does.
    pub fn init(self) -> (TelemetryGuards, FilterHandle) {
        let (filter, reload_handle) = reload::Layer::new(self.env_filter());
        let fmt_layer = if self.json_log_output {
            fmt::layer()
                .json()
                .with_file(self.log_file_and_line)
                .with_line_number(self.log_file_and_line)
                .boxed()
        } else {
            fmt::layer()
                .with_ansi(true)
                .with_file(self.log_file_and_line)
                .with_line_number(self.log_file_and_line)
                .boxed()
        };
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
        (TelemetryGuards, FilterHandle(reload_handle))
    }
}

static TEST_SUBSCRIBER: OnceCell<()> = OnceCell::new();

/// Installs a test writer subscriber once per process. Safe to call from every test.
pub fn init_for_testing() {
    TEST_SUBSCRIBER.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_uses_log_level() {
        let config = TelemetryConfig::new().with_log_level("relay_bridge=debug");
        assert_eq!(config.env_filter().to_string(), "relay_bridge=debug");
    }

    #[test]
    fn test_init_for_testing_is_idempotent() {
        init_for_testing();
        init_for_testing();
        tracing::info!("telemetry initialized");
    }
}
