use env_logger::Env;
use log::LevelFilter;

/// Initialize the `env_logger` backend for the MusAI binaries
///
/// `verbose` and `quiet` are the repeat counts of `-v` and `-q`. Without either, the
/// level comes from `RUST_LOG` and defaults to `info`.
pub fn init_logging(verbose: u8, quiet: u8) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();

    if let Some(level) = level_for(verbose, quiet) {
        builder.filter_level(level);
    }

    // A second init (tests, nested binaries) keeps the first logger
    let _ = builder.try_init();
}

fn level_for(verbose: u8, quiet: u8) -> Option<LevelFilter> {
    match (verbose, quiet) {
        (0, 0) => None,
        (_, 1) => Some(LevelFilter::Warn),
        (_, q) if q > 1 => Some(LevelFilter::Error),
        (1, _) => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_for(0, 0), None);
        assert_eq!(level_for(1, 0), Some(LevelFilter::Debug));
        assert_eq!(level_for(3, 0), Some(LevelFilter::Trace));
        assert_eq!(level_for(0, 1), Some(LevelFilter::Warn));
        assert_eq!(level_for(2, 2), Some(LevelFilter::Error));
    }
}
