use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, MarkingRule};
use crate::db::types::{FinalizePolicy, PreviewState, Transition};
use crate::repositories::{ExamAccess, ExamStore, StoreError};

struct Entry {
    exam: Exam,
    reviewers: HashSet<String>,
}

/// In-process store for service and router tests. One mutex guards all
/// exams, so every operation is trivially atomic.
#[derive(Clone, Default)]
pub(crate) struct MemoryExamStore {
    exams: Arc<Mutex<HashMap<String, Entry>>>,
    latency: Option<Duration>,
}

impl MemoryExamStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` before touching data.
    pub(crate) fn with_latency(latency: Duration) -> Self {
        Self { latency: Some(latency), ..Self::default() }
    }

    pub(crate) async fn insert(&self, exam: Exam) {
        let entry = Entry { exam, reviewers: HashSet::new() };
        self.exams.lock().await.insert(entry.exam.id.clone(), entry);
    }

    pub(crate) async fn add_reviewer(&self, exam_id: &str, user_id: &str) {
        if let Some(entry) = self.exams.lock().await.get_mut(exam_id) {
            entry.reviewers.insert(user_id.to_string());
        }
    }

    pub(crate) async fn snapshot(&self, exam_id: &str) -> Option<Exam> {
        self.exams.lock().await.get(exam_id).map(|entry| entry.exam.clone())
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn stamp(exam: &mut Exam, target: PreviewState) {
    let now = primitive_now_utc();
    match target {
        PreviewState::Draft => {}
        PreviewState::PreviewInProgress => exam.preview_started_at = Some(now),
        PreviewState::PreviewComplete => exam.preview_completed_at = Some(now),
        PreviewState::Finalized => exam.finalized_at = Some(now),
    }
    exam.preview_state = target;
    exam.revision += 1;
    exam.updated_at = now;
}

#[async_trait]
impl ExamStore for MemoryExamStore {
    async fn load(&self, exam_id: &str) -> Result<Exam, StoreError> {
        self.delay().await;
        self.snapshot(exam_id).await.ok_or(StoreError::NotFound)
    }

    async fn replace_marking_rule(
        &self,
        exam_id: &str,
        question_index: usize,
        rule: MarkingRule,
        _editor_id: &str,
    ) -> Result<Exam, StoreError> {
        self.delay().await;
        let mut exams = self.exams.lock().await;
        let entry = exams.get_mut(exam_id).ok_or(StoreError::NotFound)?;
        let exam = &mut entry.exam;

        if exam.preview_state.is_locked() {
            return Err(StoreError::Locked);
        }
        let count = exam.questions.len();
        let question = exam
            .questions
            .get_mut(question_index)
            .ok_or(StoreError::IndexOutOfRange { index: question_index, count })?;

        question.marking = rule;
        exam.revision += 1;
        exam.updated_at = primitive_now_utc();
        Ok(exam.clone())
    }

    async fn advance_state(
        &self,
        exam_id: &str,
        target: PreviewState,
        policy: FinalizePolicy,
    ) -> Result<(Exam, Transition), StoreError> {
        self.delay().await;
        let mut exams = self.exams.lock().await;
        let exam = &mut exams.get_mut(exam_id).ok_or(StoreError::NotFound)?.exam;

        let transition = exam.preview_state.plan(target, policy)?;
        if matches!(transition, Transition::Advanced { .. }) {
            stamp(exam, target);
        }
        Ok((exam.clone(), transition))
    }
}

#[async_trait]
impl ExamAccess for MemoryExamStore {
    async fn can_act(&self, exam_id: &str, caller_id: &str) -> Result<bool, StoreError> {
        self.delay().await;
        let exams = self.exams.lock().await;
        Ok(exams.get(exam_id).is_some_and(|entry| {
            entry.exam.owner_id == caller_id || entry.reviewers.contains(caller_id)
        }))
    }
}
