use std::time::Duration;

use shared::domain::{GroupName, MAX_MESSAGE_CHARS};

pub const DEFAULT_HISTORY_CAPACITY: usize = 500;
pub const DEFAULT_HISTORY_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Group every user is enrolled in when they join.
    pub default_group: GroupName,
    /// Messages retained per conversation.
    pub history_capacity: usize,
    /// Messages returned by a history load.
    pub history_page_size: usize,
    pub max_message_chars: usize,
    /// How long the persister waits after a change before writing, so that
    /// bursts of messages share one snapshot.
    pub persist_debounce: Duration,
    pub persist_max_attempts: u32,
    pub persist_retry_delay: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            default_group: GroupName::general(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            max_message_chars: MAX_MESSAGE_CHARS,
            persist_debounce: Duration::from_millis(250),
            persist_max_attempts: 3,
            persist_retry_delay: Duration::from_millis(200),
        }
    }
}
