//! Log subscriber setup.

use crate::errors::ResumeflowError;
use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber.
///
/// Uses the `RUST_LOG` env var if set, otherwise `default_level`. With
/// `json` set, events are written as one JSON object per line.
///
/// # Errors
///
/// Returns [`ResumeflowError::Observability`] if a global subscriber is
/// already installed.
pub fn init_tracing(default_level: &str, json: bool) -> Result<(), ResumeflowError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| ResumeflowError::Observability(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_an_error() {
        // The first call may lose to another test's subscriber; the second never wins.
        let _ = init_tracing("debug", false);
        assert!(matches!(
            init_tracing("info", true),
            Err(ResumeflowError::Observability(_))
        ));
    }
}
