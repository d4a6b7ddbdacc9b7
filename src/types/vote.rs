//! Vote values, targets and aggregate tallies.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AnswerId, CommentId, UserId};

/// A signed vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i64")]
pub enum VoteValue {
    /// -1
    Dislike,
    /// 0, a retracted vote.
    Neutral,
    /// +1
    Like,
}

impl VoteValue {
    /// Numeric value in {-1, 0, 1}.
    pub fn as_i8(self) -> i8 {
        match self {
            Self::Dislike => -1,
            Self::Neutral => 0,
            Self::Like => 1,
        }
    }
}

impl From<VoteValue> for i8 {
    fn from(value: VoteValue) -> Self {
        value.as_i8()
    }
}

/// Raw value outside {-1, 0, 1}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("vote value must be -1, 0 or 1, got {0}")]
pub struct InvalidVoteValue(pub i64);

impl TryFrom<i64> for VoteValue {
    type Error = InvalidVoteValue;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            -1 => Ok(Self::Dislike),
            0 => Ok(Self::Neutral),
            1 => Ok(Self::Like),
            other => Err(InvalidVoteValue(other)),
        }
    }
}

/// Entity a vote applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum VoteTarget {
    /// An answer.
    Answer(AnswerId),
    /// A comment.
    Comment(CommentId),
}

impl VoteTarget {
    /// Storage label of the target kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Answer(_) => "answer",
            Self::Comment(_) => "comment",
        }
    }

    /// Raw id of the target row.
    pub fn raw_id(&self) -> i64 {
        match self {
            Self::Answer(id) => id.get(),
            Self::Comment(id) => id.get(),
        }
    }
}

impl fmt::Display for VoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.raw_id())
    }
}

/// Like/dislike aggregates on a votable target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Number of +1 votes.
    pub like_cnt: u32,
    /// Number of -1 votes.
    pub dislike_cnt: u32,
}

impl Tally {
    /// Apply a delta, returning `None` if a counter would go negative.
    pub fn apply(self, delta: TallyDelta) -> Option<Self> {
        Some(Self {
            like_cnt: offset(self.like_cnt, delta.like)?,
            dislike_cnt: offset(self.dislike_cnt, delta.dislike)?,
        })
    }
}

fn offset(count: u32, delta: i32) -> Option<u32> {
    u32::try_from(i64::from(count) + i64::from(delta)).ok()
}

/// Counter change produced by one vote transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyDelta {
    /// Change to `like_cnt`.
    pub like: i32,
    /// Change to `dislike_cnt`.
    pub dislike: i32,
}

impl TallyDelta {
    /// Delta for moving a voter from `previous` (None = never voted) to `next`.
    pub fn transition(previous: Option<VoteValue>, next: VoteValue) -> Self {
        let undo = match previous {
            Some(VoteValue::Like) => Self { like: -1, dislike: 0 },
            Some(VoteValue::Dislike) => Self { like: 0, dislike: -1 },
            Some(VoteValue::Neutral) | None => Self::default(),
        };
        if previous == Some(next) {
            return Self::default();
        }
        match next {
            VoteValue::Like => Self { like: undo.like + 1, ..undo },
            VoteValue::Dislike => Self { dislike: undo.dislike + 1, ..undo },
            VoteValue::Neutral => undo,
        }
    }

    /// True when the transition changes no counter.
    pub fn is_zero(&self) -> bool {
        self.like == 0 && self.dislike == 0
    }
}

/// A persisted vote row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Who voted.
    pub voter: UserId,
    /// What was voted on.
    pub target: VoteTarget,
    /// Current value.
    pub value: VoteValue,
}

/// Compare-and-set request committed by the vote store.
///
/// `expected` is the previous vote the ledger observed; the store must
/// reject the commit with a conflict if the row no longer matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteCommit {
    /// Who is voting.
    pub voter: UserId,
    /// Target of the vote.
    pub target: VoteTarget,
    /// Vote state observed before the change.
    pub expected: Option<VoteValue>,
    /// New vote value.
    pub value: VoteValue,
    /// Counter change to apply with the row write.
    pub delta: TallyDelta,
}
