//! Runtime tunables for the core managers.
//!
//! All settings can be configured via environment variables:
//! - `QA_PAGE_SIZE`: comments and replies per page (default: 6)
//! - `QA_BRIEF_REPLIES`: replies shown under each root comment (default: 2)
//! - `QA_TIMELINE_PAGE_SIZE`: timeline messages per page (default: 30)
//! - `QA_TOP_MATCHES`: matches returned by default (default: 4)

use serde::{Deserialize, Serialize};

/// Default comments per page.
pub const DEFAULT_PAGE_SIZE: usize = 6;
/// Default brief reply cap.
pub const DEFAULT_BRIEF_REPLIES: usize = 2;
/// Default timeline page size.
pub const DEFAULT_TIMELINE_PAGE_SIZE: usize = 30;
/// Default number of matches.
pub const DEFAULT_TOP_MATCHES: usize = 4;

/// Paging and ranking defaults shared by the managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Comments and replies per page.
    pub page_size: usize,
    /// Replies shown under each root comment.
    pub brief_replies: usize,
    /// Timeline messages per page.
    pub timeline_page_size: usize,
    /// Matches returned when the caller gives no count.
    pub top_matches: usize,
}

impl CoreConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Zero or unparsable values are ignored.
    pub fn from_env() -> Self {
        Self {
            page_size: env_count("QA_PAGE_SIZE", DEFAULT_PAGE_SIZE),
            brief_replies: env_count("QA_BRIEF_REPLIES", DEFAULT_BRIEF_REPLIES),
            timeline_page_size: env_count("QA_TIMELINE_PAGE_SIZE", DEFAULT_TIMELINE_PAGE_SIZE),
            top_matches: env_count("QA_TOP_MATCHES", DEFAULT_TOP_MATCHES),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            brief_replies: DEFAULT_BRIEF_REPLIES,
            timeline_page_size: DEFAULT_TIMELINE_PAGE_SIZE,
            top_matches: DEFAULT_TOP_MATCHES,
        }
    }
}

fn env_count(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}
