//! Logging utilities and structured logging support

use env_logger::{Builder, Env};

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize logging with a fallback level when `RUST_LOG` is not set.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_with_level(level: log::LevelFilter) {
    let _ = builder_with_fallback(level, Env::default()).try_init();
}

/// Builder at `level`, overridden by any directives found in `env`
fn builder_with_fallback(level: log::LevelFilter, env: Env<'_>) -> Builder {
    let mut builder = Builder::new();
    builder.filter_level(level).parse_env(env);
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::LevelFilter;

    #[test]
    fn test_env_directive_overrides_fallback() {
        std::env::set_var("DEFERRED_ENGINE_TEST_LOG_DEBUG", "debug");
        let env = Env::new().filter("DEFERRED_ENGINE_TEST_LOG_DEBUG");
        let logger = builder_with_fallback(LevelFilter::Info, env).build();
        assert_eq!(logger.filter(), LevelFilter::Debug);
    }

    #[test]
    fn test_fallback_applies_without_env() {
        let env = Env::new().filter("DEFERRED_ENGINE_TEST_LOG_UNSET");
        let logger = builder_with_fallback(LevelFilter::Info, env).build();
        assert_eq!(logger.filter(), LevelFilter::Info);
    }

    #[test]
    fn test_quieter_env_directive_wins() {
        std::env::set_var("DEFERRED_ENGINE_TEST_LOG_WARN", "warn");
        let env = Env::new().filter("DEFERRED_ENGINE_TEST_LOG_WARN");
        let logger = builder_with_fallback(LevelFilter::Info, env).build();
        assert_eq!(logger.filter(), LevelFilter::Warn);
    }
}
