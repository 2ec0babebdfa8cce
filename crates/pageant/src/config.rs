//! Bridge configuration.
//!
//! Defaults match stock Pageant: window class/title `Pageant` and an
//! unbounded wait on the notification. Both can be overridden from the
//! environment:
//! - `PAGEANT_WINDOW`: window class/title to look for
//! - `PAGEANT_SEND_TIMEOUT_MS`: bound the synchronous notification (unset or 0 = wait forever)

use std::time::Duration;

/// Window class and title registered by Pageant.
pub const DEFAULT_WINDOW_NAME: &str = "Pageant";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub window_name: String,
    /// `None` blocks until the agent answers, however long that takes.
    pub send_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            window_name: DEFAULT_WINDOW_NAME.to_string(),
            send_timeout: None,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(name) = lookup("PAGEANT_WINDOW")
            && !name.trim().is_empty()
        {
            config.window_name = name.trim().to_string();
        }

        config.send_timeout = lookup("PAGEANT_SEND_TIMEOUT_MS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        config
    }

    pub fn with_window_name(mut self, name: impl Into<String>) -> Self {
        self.window_name = name.into();
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }
}
