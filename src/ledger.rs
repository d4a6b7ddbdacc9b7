//! Vote ledger.
//!
//! The only code path that changes `like_cnt` / `dislike_cnt`. A vote is a
//! read (the voter's previous value), a pure transition to a counter delta,
//! and one compare-and-set committed by the store.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::store::{UserStore, VoteStore};
use crate::types::{Caller, Tally, TallyDelta, Vote, VoteCommit, VoteTarget, VoteValue};

/// Per-(voter, target) vote state machine with counter maintenance.
pub struct VoteLedger<S> {
    store: Arc<S>,
}

impl<S> Clone for VoteLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: UserStore + VoteStore> VoteLedger<S> {
    /// Create a ledger over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Cast, change or retract a vote and return the updated aggregates.
    ///
    /// `raw_value` must be -1, 0 or 1. Re-casting the current value is a
    /// no-op. A concurrent vote by the same voter on the same target makes
    /// this call fail with [`CoreError::Conflict`]; it is not retried.
    pub async fn cast_vote(
        &self,
        caller: &Caller,
        target: VoteTarget,
        raw_value: i64,
    ) -> CoreResult<Tally> {
        let value = VoteValue::try_from(raw_value)?;

        if self.store.get_user(&caller.user).await?.is_none() {
            return Err(CoreError::not_found("user", &caller.user));
        }
        let tally = self
            .store
            .get_tally(target)
            .await?
            .ok_or_else(|| CoreError::not_found(target.kind(), target.raw_id()))?;

        let previous = self.store.get_vote(&caller.user, target).await?;
        if previous == Some(value) {
            tracing::debug!(voter = %caller.user, %target, value = value.as_i8(), "Vote unchanged");
            return Ok(tally);
        }

        let delta = TallyDelta::transition(previous, value);
        let updated = self
            .store
            .commit_vote(VoteCommit {
                voter: caller.user.clone(),
                target,
                expected: previous,
                value,
                delta,
            })
            .await
            .map_err(|e| {
                tracing::warn!(voter = %caller.user, %target, error = %e, "Vote commit rejected");
                CoreError::from(e)
            })?;

        tracing::info!(
            voter = %caller.user,
            %target,
            previous = previous.map(|v| v.as_i8()),
            value = value.as_i8(),
            like_cnt = updated.like_cnt,
            dislike_cnt = updated.dislike_cnt,
            "Vote recorded"
        );
        Ok(updated)
    }

    /// Current aggregates of a target.
    pub async fn tally(&self, target: VoteTarget) -> CoreResult<Tally> {
        self.store
            .get_tally(target)
            .await?
            .ok_or_else(|| CoreError::not_found(target.kind(), target.raw_id()))
    }

    /// Every vote row on a target.
    pub async fn votes_for(&self, target: VoteTarget) -> CoreResult<Vec<Vote>> {
        Ok(self.store.votes_for(target).await?)
    }
}
