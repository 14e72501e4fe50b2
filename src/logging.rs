use tracing_subscriber::EnvFilter;

/// Install the stderr `fmt` subscriber.
///
/// `RUST_LOG` wins over `level` when set. `verbose` raises the fallback to
/// `debug`. Calling this twice is harmless; the second call is ignored.
pub fn init(level: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
