use serde::{Deserialize, Serialize};

/// Default name of the receive worker thread.
pub const DEFAULT_THREAD_NAME: &str = "busplot-rx";

/// Default number of back-to-back failed reads tolerated mid-frame.
pub const DEFAULT_MAX_CONSECUTIVE_READ_ERRORS: u32 = 16;

/// Receive engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name given to the receive worker thread.
    pub thread_name: String,
    /// Failed header/body reads in a row after which the link is treated as
    /// lost. A successful frame or any other discard resets the count.
    pub max_consecutive_read_errors: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            max_consecutive_read_errors: DEFAULT_MAX_CONSECUTIVE_READ_ERRORS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.thread_name, "busplot-rx");
        assert_eq!(config.max_consecutive_read_errors, 16);
    }
}
