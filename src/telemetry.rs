//! Tracing setup shared by embedding binaries and integration tests.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging from the environment.
///
/// Honors a `.env` file when present and `RUST_LOG` for filtering. Safe to
/// call more than once; repeat initializations are ignored.
pub fn init() {
    let _ = dotenvy::dotenv();

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kestrel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
