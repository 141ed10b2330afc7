use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the process-wide subscriber used by the `qissy` binary.
///
/// `RUST_LOG` takes precedence; otherwise `verbose` switches the crate to debug.
pub fn init_logger(verbose: bool) {
    let default_directive = if verbose { "qissy=debug,info" } else { "qissy=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}
