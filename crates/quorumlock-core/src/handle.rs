//! Lock handles

use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::token::LockToken;

/// Lifecycle state of a lock handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Quorum reached and the validity deadline has not passed
    Held,
    /// The validity deadline passed without an extension
    Expired,
    /// An extension failed to keep quorum; exclusivity is no longer guaranteed
    Lost,
    /// Explicitly released
    Released,
}

impl LockState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Held => "held",
            LockState::Expired => "expired",
            LockState::Lost => "lost",
            LockState::Released => "released",
        }
    }
}

impl Display for LockState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Name and token of an acquisition, enough to release it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockIdentity {
    pub name: String,
    pub key: String,
    pub token: LockToken,
}

/// One successful acquisition of a named lock.
///
/// Owned by the task that acquired it; operations on a single handle must be
/// serialized, which `&mut` access enforces.
#[derive(Debug)]
pub struct LockHandle {
    name: String,
    key: String,
    token: LockToken,
    acquired_at: Instant,
    deadline: Instant,
    acquired: usize,
    extensions: u32,
    state: LockState,
}

impl LockHandle {
    pub(crate) fn new(
        name: String,
        key: String,
        token: LockToken,
        acquired_at: Instant,
        deadline: Instant,
        acquired: usize,
    ) -> Self {
        Self {
            name,
            key,
            token,
            acquired_at,
            deadline,
            acquired,
            extensions: 0,
            state: LockState::Held,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store key the lock record lives under.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &LockToken {
        &self.token
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    /// Instant after which exclusivity is no longer guaranteed.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Stores that accepted the most recent acquire or extend.
    pub fn acquired_stores(&self) -> usize {
        self.acquired
    }

    pub fn extensions(&self) -> u32 {
        self.extensions
    }

    /// Current state; a held handle past its deadline reports `Expired`.
    pub fn state(&self) -> LockState {
        match self.state {
            LockState::Held if Instant::now() >= self.deadline => LockState::Expired,
            state => state,
        }
    }

    /// Pure local check: held and before the deadline. Does not contact stores.
    pub fn is_valid(&self) -> bool {
        self.state() == LockState::Held
    }

    /// Validity left, zero once the handle is no longer held.
    pub fn remaining(&self) -> Duration {
        if self.is_valid() {
            self.deadline.saturating_duration_since(Instant::now())
        } else {
            Duration::ZERO
        }
    }

    pub fn identity(&self) -> LockIdentity {
        LockIdentity {
            name: self.name.clone(),
            key: self.key.clone(),
            token: self.token.clone(),
        }
    }

    pub(crate) fn extended(&mut self, deadline: Instant, acquired: usize) {
        self.deadline = self.deadline.max(deadline);
        self.acquired = acquired;
        self.extensions += 1;
    }

    pub(crate) fn mark(&mut self, state: LockState) {
        self.state = state;
    }
}
