use log::LevelFilter;

/// Initialize logging using env_logger.
/// By default, this reads the RUST_LOG environment variable for filtering,
/// falling back to `info` for everything else.
/// e.g., `RUST_LOG=wallet_core=debug wallet-conn show`
pub fn init_logging() {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();
}
