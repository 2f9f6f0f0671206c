//! Core data model.
//!
//! A work-queue element is one dispatchable unit of a job specification. It
//! may reference a data block, carries a priority, and moves through a fixed
//! lifecycle while agents acquire and process it.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Element identifier. Generated by the backend on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub i64);

/// Block identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub i64);

/// Subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub i64);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Waiting in the backlog. Initial state of every element.
    Available,
    /// Selected by an acquisition in progress.
    Negotiating,
    /// Claimed by an agent; binding is now fixed.
    Acquired,
    /// The agent reported that processing started.
    Running,
    /// Finished successfully. Terminal.
    Done,
    /// Processing failed. Terminal once the retry budget is spent.
    Failed,
    /// Withdrawn by a caller. Terminal.
    Canceled,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::Available,
        Status::Negotiating,
        Status::Acquired,
        Status::Running,
        Status::Done,
        Status::Failed,
        Status::Canceled,
    ];

    /// Can transition from self to `to`?
    ///
    /// `Failed -> Available` is additionally gated on the retry budget, which
    /// only the caller holding the policy can check.
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Available, Negotiating)
                | (Available, Canceled)
                | (Negotiating, Acquired)
                | (Negotiating, Available) // negotiation abandoned
                | (Acquired, Running)
                | (Acquired, Available)    // agent declined
                | (Running, Done)
                | (Running, Failed)
                | (Running, Canceled)
                | (Failed, Available) // retry
        )
    }

    /// Terminal regardless of retry budget.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done | Status::Canceled)
    }

    /// Finished processing one way or another. Associations of a settled
    /// element are no longer live.
    pub fn is_settled(self) -> bool {
        matches!(self, Status::Done | Status::Failed | Status::Canceled)
    }

    /// Subscription bindings may still change in this status.
    pub fn accepts_binding(self) -> bool {
        matches!(self, Status::Available | Status::Negotiating)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Available => "Available",
            Status::Negotiating => "Negotiating",
            Status::Acquired => "Acquired",
            Status::Running => "Running",
            Status::Done => "Done",
            Status::Failed => "Failed",
            Status::Canceled => "Canceled",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidInput(format!("unknown status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

/// A unit of dispatchable work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,

    /// Job specification this element was split from.
    pub spec_name: String,

    pub status: Status,

    /// Higher = scheduled first. Never negative.
    pub priority: i64,

    /// Data block this element processes, if any.
    pub block_name: Option<String>,

    pub number_of_jobs: i64,

    /// Number of failures reported so far.
    pub retry_count: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Element {
    /// Terminal for good: done, canceled, or failed beyond the retry budget.
    pub fn is_terminal(&self, max_retries: u32) -> bool {
        self.status.is_terminal()
            || (self.status == Status::Failed && self.retry_count > i64::from(max_retries))
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A named data block an element may process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A named binding scope through which agents claim elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Builder for a new element. Inserted elements always start `Available`.
#[derive(Debug, Clone)]
pub struct NewElement {
    pub(crate) spec_name: String,
    pub(crate) priority: i64,
    pub(crate) block_name: Option<String>,
    pub(crate) number_of_jobs: i64,
}

impl NewElement {
    pub fn new(spec_name: impl Into<String>) -> Self {
        Self {
            spec_name: spec_name.into(),
            priority: 0,
            block_name: None,
            number_of_jobs: 1,
        }
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn block(mut self, block_name: impl Into<String>) -> Self {
        self.block_name = Some(block_name.into());
        self
    }

    pub fn number_of_jobs(mut self, n: i64) -> Self {
        self.number_of_jobs = n;
        self
    }
}

/// One element as supplied by the work-spec layer at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRequest {
    pub block_name: Option<String>,
    pub parent_block_name: Option<String>,
    pub number_of_jobs: i64,
    pub priority: i64,
}

impl ElementRequest {
    pub fn new(number_of_jobs: i64, priority: i64) -> Self {
        Self {
            block_name: None,
            parent_block_name: None,
            number_of_jobs,
            priority,
        }
    }

    pub fn block(mut self, block_name: impl Into<String>) -> Self {
        self.block_name = Some(block_name.into());
        self
    }

    pub fn parent(mut self, parent_block_name: impl Into<String>) -> Self {
        self.parent_block_name = Some(parent_block_name.into());
        self
    }
}
