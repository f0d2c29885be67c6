/// Logging initialization.
///
/// Installs a `tracing-subscriber` fmt subscriber writing to stderr. The
/// filter comes from `RUST_LOG` when set, otherwise
/// `parley_core=debug,info`.
///
/// Called once at the start of `SyncApp::new()`. Safe to call repeatedly; only
/// the first global subscriber wins, which lets tests and the CLI install
/// their own.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley_core=debug,info".into()),
        )
        .with_target(true)
        .try_init();
}
