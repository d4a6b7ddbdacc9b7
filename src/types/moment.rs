//! Moments: short status updates outside the Q&A timeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{MomentId, UserId};

/// A status update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Moment {
    /// Row id.
    pub id: MomentId,
    /// Author; `None` once the account is gone.
    pub author: Option<UserId>,
    /// Body.
    pub content: String,
    /// Attached image.
    pub image_url: Option<String>,
    /// Quoted excerpt.
    pub quote: Option<String>,
    /// Publication time.
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when posting a moment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewMoment {
    /// Author.
    pub author: UserId,
    /// Body.
    pub content: String,
    /// Attached image.
    pub image_url: Option<String>,
    /// Quoted excerpt.
    pub quote: Option<String>,
}
