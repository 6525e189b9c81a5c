//! Log output for applications that do not install their own subscriber.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, defaulting to
/// `keiro=info`. Returns `false` if a global subscriber was already set.
pub fn init() -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "keiro=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
