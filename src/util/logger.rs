//! Built-in logger bootstrap.
//!
//! The built-in implementation uses the `env_logger` crate behind the Cargo
//! feature "builtin_env_logger", which is enabled by default. It is
//! initialized from [`crate::memory_manager::init`] and shows logs of level
//! INFO or lower. Hosts that already install their own `log` backend can
//! disable the feature and this function becomes a no-op.

/// Attempt to init an env_logger for the collector.
/// Does nothing if the "builtin_env_logger" feature is disabled.
pub(crate) fn try_init() {
    cfg_if::cfg_if! {
        if #[cfg(feature = "builtin_env_logger")] {
            let result = env_logger::try_init_from_env(
                // By default, show info level logging.
                env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
            );

            match result {
                Ok(()) => {
                    debug!("cgc initialized the built-in logger.");
                }
                Err(e) => {
                    // The only current failure mode: a logger was already
                    // installed, most likely by the host program.
                    debug!("cgc did not initialize the built-in env_logger: {e}");
                }
            }
        } else {
            debug!("cgc built without the builtin_env_logger feature; no logger installed.");
        }
    }
}
