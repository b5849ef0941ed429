use crate::config::AppConfig;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Build revision stamped by `build.rs`
pub const REVISION: &str = env!("ESCROW_DESK_REVISION");

/// Install the global subscriber and log the build revision.
///
/// Keep the guard alive for the process lifetime or buffered file output is
/// lost. `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let (writer, guard) = log_file_writer(config);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config.log_level)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(writer).with_ansi(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(writer).with_ansi(false))
            .with(fmt::layer().with_target(false).with_ansi(true))
            .init();
    }

    tracing::info!(
        revision = REVISION,
        log_dir = %config.log_dir,
        rotation = %config.rotation,
        json = config.use_json,
        "Logging initialized"
    );
    guard
}

fn log_file_writer(config: &AppConfig) -> (NonBlocking, WorkerGuard) {
    let dir = &config.log_dir;
    let file = &config.log_file;
    let appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(dir, file),
        "daily" => tracing_appender::rolling::daily(dir, file),
        _ => tracing_appender::rolling::never(dir, file),
    };
    tracing_appender::non_blocking(appender)
}

/// Configured level plus per-crate caps; sqlx logs every statement at info
fn filter_directives(level: &str) -> String {
    format!("{level},sqlx=warn,hyper=warn")
}
