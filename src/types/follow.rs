//! Follow edges and pairing scores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::UserId;

/// Directed follow relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowEdge {
    /// The user who follows.
    pub follower: UserId,
    /// The user being followed.
    pub followee: UserId,
    /// When the edge was created.
    pub created_at: DateTime<Utc>,
}

/// Persisted affinity between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    /// Subject the score was computed for.
    pub user_a: UserId,
    /// The other user.
    pub user_b: UserId,
    /// Weighted-Jaccard degree, ≥ 0.
    pub degree: f64,
}

impl PairScore {
    /// The side of the pair that is not `user`.
    pub fn other(&self, user: &UserId) -> &UserId {
        if &self.user_a == user {
            &self.user_b
        } else {
            &self.user_a
        }
    }
}

/// Where a recommendation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// A persisted pair score.
    Computed,
    /// Tag-overlap and popularity fallback used before any score exists.
    ColdStart,
}

/// One recommended user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Recommended user.
    pub user: UserId,
    /// Pair degree, or `None` for cold-start entries.
    pub degree: Option<f64>,
    /// Follower count of the recommended user.
    pub follower_cnt: u32,
    /// Tags of the subject found in the recommended user's tags.
    pub shared_tags: u32,
    /// Origin of the recommendation.
    pub source: MatchSource,
}
