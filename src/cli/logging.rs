//! Tracing subscriber setup.

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use mnemosine::config::{LogFormat, LoggingConfig};

/// Filter directive used when `RUST_LOG` is unset.
fn default_directive(config: &LoggingConfig, debug: bool) -> String {
    config
        .level
        .clone()
        .unwrap_or_else(|| if debug { "debug" } else { "info" }.to_string())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &LoggingConfig, debug: bool) -> Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::try_new(&directives)
                .with_context(|| format!("invalid RUST_LOG '{directives}'"))?
        }
        _ => {
            let directive = default_directive(config, debug);
            EnvFilter::try_new(&directive)
                .with_context(|| format!("invalid LOG_LEVEL '{directive}'"))?
        }
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_precedence() {
        let mut config = LoggingConfig::default();
        assert_eq!(default_directive(&config, false), "info");
        assert_eq!(default_directive(&config, true), "debug");
        config.level = Some("warn,mnemosine=trace".to_string());
        assert_eq!(default_directive(&config, true), "warn,mnemosine=trace");
    }
}
