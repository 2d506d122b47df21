//! Tracing subscriber setup driven by [`CompositionConfig`] (spec.md §8).

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::CompositionConfig;

/// Installs a global subscriber combining an env-filter, an optional
/// stdout layer, and an optional JSON file layer. `RUST_LOG` overrides
/// `config.log_level` when set. Safe to call more than once per process;
/// a later call that fails to install (because one is already set) is
/// silently ignored.
pub fn init(config: &CompositionConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let stdout_layer = config.print_log.then(|| fmt::layer().with_target(false));

    let file_layer = config.log_file.as_ref().and_then(|file| {
        if let Err(e) = std::fs::create_dir_all(&file.directory) {
            eprintln!("finam: could not create log directory {:?}: {e}", file.directory);
            return None;
        }
        let path = file.directory.join(&file.file_name);
        match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(handle) => Some(
                fmt::layer()
                    .json()
                    .with_writer(move || handle.try_clone().expect("clone log file handle")),
            ),
            Err(e) => {
                eprintln!("finam: could not open log file {path:?}: {e}");
                None
            }
        }
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
}
