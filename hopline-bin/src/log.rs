pub use tracing::{error, info};

/// Level applied to the hopline crates when `RUST_LOG` is not set
const DEFAULT_LOG_LEVEL: &str = "info";

/// Installs a compact fmt subscriber.
/// `RUST_LOG` takes a bare level that is scoped to the hopline crates, e.g., `RUST_LOG=trace` shows message traces.
pub fn init_logger() {
  use tracing_subscriber::{fmt, prelude::*, EnvFilter};

  let level = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
  // prefix match: covers both `hopline` and `hopline_lib` targets
  let filter_layer = EnvFilter::builder().parse_lossy(format!("{}={}", env!("CARGO_PKG_NAME"), level));
  let format_layer = fmt::layer()
    .compact()
    .with_target(true)
    .with_level(true)
    .with_thread_names(true)
    .with_line_number(false);

  tracing_subscriber::registry()
    .with(filter_layer)
    .with(format_layer)
    .init();
}
