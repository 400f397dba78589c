/// Tunables for the messaging core.
#[derive(Debug, Clone, Copy)]
pub struct ChatConfig {
    /// Maximum message body length in characters, after trimming.
    pub max_message_len: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_len: 2000,
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Self {
        let max_message_len = std::env::var("BUGLE_MAX_MESSAGE_LEN")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::default().max_message_len);
        Self { max_message_len }
    }
}
