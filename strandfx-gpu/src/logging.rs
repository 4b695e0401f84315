//! Tracing subscriber setup.

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
///
/// With the `tracy` feature the fmt layer is stacked on a Tracy layer so
/// frame and pass spans show up in the profiler.
pub fn init_logging(level: &str) {
    #[cfg(feature = "tracy")]
    {
        use tracing_subscriber::Layer;
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;
        let registry = tracing_subscriber::registry()
            .with(tracing_tracy::TracyLayer::default())
            .with(tracing_subscriber::fmt::layer().with_filter(env_filter(level)));
        if registry.try_init().is_err() {
            tracing::debug!("Global subscriber already installed");
        }
        return;
    }

    #[cfg(not(feature = "tracy"))]
    if tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(false)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global subscriber already installed");
    }
}

fn env_filter(level: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging("debug");
        init_logging("info");
        tracing::info!("still logging");
    }
}
