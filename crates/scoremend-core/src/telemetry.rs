//! Tracing initialisation for Scoremend binaries.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set. With `json` the
/// subscriber emits newline-delimited JSON lines. Idempotent: a second call
/// is a no-op because the global subscriber can only be installed once.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    let layer = fmt::layer().with_target(false);
    if json {
        registry.with(layer.json()).try_init().ok();
    } else {
        registry.with(layer.compact()).try_init().ok();
    }
}
