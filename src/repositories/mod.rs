//! Storage seam of the preview workflow.
//!
//! `ExamStore` is the only writer of preview state and marking rules. Each
//! operation is atomic per exam: the lock check and the write happen inside
//! one transaction, and a dropped future rolls back.

pub(crate) mod exam_access;
pub(crate) mod exams;
#[cfg(test)]
pub(crate) mod memory;
pub(crate) mod questions;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::{Exam, MarkingRule};
use crate::db::types::{FinalizePolicy, PreviewState, Transition, TransitionError};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("exam not found")]
    NotFound,
    #[error("question index {index} is out of range for {count} question(s)")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("exam is finalized")]
    Locked,
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => Self::Unavailable(err.to_string()),
            _ => Self::Backend(err.to_string()),
        }
    }
}

#[async_trait]
pub(crate) trait ExamStore: Send + Sync {
    async fn load(&self, exam_id: &str) -> Result<Exam, StoreError>;

    /// Overwrites the rule of the question at `question_index` (0-based, in
    /// exam order). Fails with `Locked` on finalized exams.
    async fn replace_marking_rule(
        &self,
        exam_id: &str,
        question_index: usize,
        rule: MarkingRule,
        editor_id: &str,
    ) -> Result<Exam, StoreError>;

    /// Moves the exam towards `target` as decided by [`PreviewState::plan`]
    /// against the state read under lock.
    async fn advance_state(
        &self,
        exam_id: &str,
        target: PreviewState,
        policy: FinalizePolicy,
    ) -> Result<(Exam, Transition), StoreError>;
}

/// The authorization collaborator: may `caller_id` act on `exam_id`?
#[async_trait]
pub(crate) trait ExamAccess: Send + Sync {
    async fn can_act(&self, exam_id: &str, caller_id: &str) -> Result<bool, StoreError>;
}
