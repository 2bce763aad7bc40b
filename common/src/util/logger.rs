use env_logger::Env;

/// Initializes logging for binaries and integration tests. Defaults to
/// `info` unless RUST_LOG overrides it; safe to call more than once.
pub fn init() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init();
}
