//! Logging setup and span helpers shared by the operator controllers.

use std::str::FromStr;
use std::sync::Once;

use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

static INIT: Once = Once::new();

/// Filter used when `RUST_LOG` is unset; the kube runtime logs every watch
/// restart at `info`.
pub const DEFAULT_LOG_FILTER: &str = "info,kube_runtime=warn,kube_client=warn";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    #[default]
    Json,
    /// Pretty-printed logs (for development).
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format '{other}' (expected json or pretty)")),
        }
    }
}

/// Installs the global subscriber.
///
/// Only the first call has an effect. `RUST_LOG` overrides
/// [`DEFAULT_LOG_FILTER`].
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        let output = match format {
            LogFormat::Json => fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .boxed(),
            LogFormat::Pretty => fmt::layer().pretty().with_target(false).boxed(),
        };
        tracing_subscriber::registry().with(output).with(filter).init();
    });
}

/// Span for one reconcile pass over a source specification.
#[must_use]
pub fn sync_span(namespace: &str, name: &str) -> Span {
    tracing::info_span!("sync_source", namespace = namespace, name = name)
}

/// Span for one timing pass over a workload instance.
#[must_use]
pub fn observe_span(namespace: &str, pod: &str) -> Span {
    tracing::info_span!("observe_pod", namespace = namespace, pod = pod)
}
