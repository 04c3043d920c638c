use log::LevelFilter;

use crate::config::EngineConfig;

/// Initialize logging (reads RUST_LOG env var). Safe to call more than once;
/// later calls are no-ops.
pub fn init() {
    let default_level = if EngineConfig::debug_mode() {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = env_logger::Builder::from_default_env()
        .filter_level(default_level)
        .try_init();
}
