// src/observability.rs
//! Logging and metrics setup
//!
//! Metrics emitted by the toolbox:
//!
//! | name | kind | labels |
//! |---|---|---|
//! | `stbx_shots_migrated_total` | counter | `rank` |
//! | `stbx_round_duration_seconds` | histogram | `rank` |
//! | `stbx_shots_dispatched_total` | counter | |
//! | `stbx_reductions_total` | counter | |

use crate::utils::config::LoggingConfig;
use crate::utils::errors::{Result, ToolboxError};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber. `RUST_LOG` overrides `config.level`.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_thread_names(true).with_target(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_thread_names(true).with_target(true))
            .try_init()
    };

    installed.map_err(|e| ToolboxError::ObservabilityFailed(format!("tracing: {}", e)))
}

/// Install the Prometheus recorder. Nothing listens on the network; the
/// driver renders the handle to a file when the run ends.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ToolboxError::ObservabilityFailed(format!("metrics: {}", e)))?;

    describe_counter!(
        "stbx_shots_migrated_total",
        Unit::Count,
        "Shots migrated by this rank"
    );
    describe_histogram!(
        "stbx_round_duration_seconds",
        Unit::Seconds,
        "Wall time of one migration round"
    );
    describe_counter!(
        "stbx_shots_dispatched_total",
        Unit::Count,
        "Shots handed out by the dynamic dispatcher"
    );
    describe_counter!(
        "stbx_reductions_total",
        Unit::Count,
        "Completed result reductions"
    );

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_level_falls_back() {
        let config = LoggingConfig {
            level: "not a [valid filter".to_string(),
            json: false,
        };
        // a second global install fails cleanly instead of panicking
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
