/// Initialises `env_logger` for the binary.
///
/// `RUST_LOG` still takes precedence so individual modules can be traced.
pub fn init_logger(verbose: bool) {
    env_logger::Builder::new()
        .filter_level(if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();
}
