use tracing_subscriber::{EnvFilter, fmt};

/// Initialize logging to stderr.
///
/// `RUST_LOG` overrides the filter. Otherwise `verbosity` picks it:
/// 0 is `warn`, 1 is `debug` for this crate, 2 and up is `trace`.
pub fn init_logging(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbosity {
            0 => "warn",
            1 => "warn,stackvm=debug",
            _ => "warn,stackvm=trace",
        })
    });

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
