use slog::{o, Drain, Level, Logger};
use sloggers::{null::NullLoggerBuilder, Build};

/// Return a logger suitable for test usage.
///
/// By default no logs will be printed, but they can be enabled via
/// the `test_logger` feature. This feature can be enabled for any
/// dependent crate by passing `--features logging/test_logger`, e.g.
/// ```bash
/// cargo test -p slashing_protection --features logging/test_logger
/// ```
pub fn test_logger() -> Logger {
    if cfg!(feature = "test_logger") {
        build_terminal_logger(Level::Debug)
    } else {
        NullLoggerBuilder
            .build()
            .unwrap_or_else(|_| Logger::root(slog::Discard, o!()))
    }
}

/// Build an asynchronous, human-readable logger writing to stderr at `level` and above.
pub fn build_terminal_logger(level: Level) -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = drain.filter_level(level).fuse();
    Logger::root(drain, o!())
}
