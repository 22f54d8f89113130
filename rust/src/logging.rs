/// Install a `tracing-subscriber::fmt` subscriber writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used (for example
/// `"postbox_core=debug,info"`). Safe to call more than once: later calls are
/// no-ops. Tests never call this, so they stay quiet.
pub fn init_logging(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
