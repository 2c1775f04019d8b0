use std::time::Duration;

/// Governing timeouts and logging toggles for a [`crate::Context`].
///
/// Every field has a built-in default; each may be overridden by an
/// environment variable, read once at [`Config::from_env`] time (called by
/// `bal::init()`), to let integration tests exercise shorter timeouts without
/// recompiling.
#[derive(Copy, Clone, Debug)]
pub struct Config {
    /// Upper bound on a single `select()` call in the event thread. Bounds
    /// shutdown latency when the live table is empty or all descriptors are
    /// idle. Default: 100ms.
    pub poll_timeout: Duration,
    /// Upper bound on the sync thread's condition-variable wait between
    /// deferred-queue drains. Default: 1s.
    pub sync_timeout: Duration,
    /// Upper bound `cleanup()` waits for each worker thread to join before
    /// logging an internal error and moving on. Default: 5s.
    pub join_timeout: Duration,
    /// Enables verbose self-diagnostic logging (thread lifecycle, deferred
    /// queue drains, poll failures) independent of the ambient `log` level.
    pub self_log: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            poll_timeout: Duration::from_millis(100),
            sync_timeout: Duration::from_secs(1),
            join_timeout: Duration::from_secs(5),
            self_log: false,
        }
    }
}

impl Config {
    /// Builds a `Config`, overriding each field from its environment variable
    /// if present and parseable; otherwise falls back to [`Config::default`].
    pub fn from_env() -> Config {
        let mut cfg = Config::default();

        if let Some(ms) = env_u64("BAL_POLL_TIMEOUT_MS") {
            cfg.poll_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("BAL_SYNC_TIMEOUT_MS") {
            cfg.sync_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("BAL_JOIN_TIMEOUT_MS") {
            cfg.join_timeout = Duration::from_millis(ms);
        }
        if let Ok(val) = std::env::var("BAL_SELFLOG") {
            cfg.self_log = val != "0" && !val.eq_ignore_ascii_case("false");
        }

        cfg
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
