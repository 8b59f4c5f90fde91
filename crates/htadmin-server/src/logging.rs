use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Installs a JSON subscriber writing to `log_file`.
///
/// With no file, or if the file can't be opened, events are dropped; the
/// service keeps running either way.
pub fn init(log_file: Option<&Path>) {
    let Some(path) = log_file else {
        return;
    };

    let file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "WARN: can't open log file '{}', logging disabled: {e}",
                path.display()
            );
            return;
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
}
