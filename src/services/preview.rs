use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::core::metrics;
use crate::db::models::{Exam, MarkingRule};
use crate::db::types::{FinalizePolicy, Mark, PreviewState, Transition, TransitionError};
use crate::repositories::{ExamAccess, ExamStore, StoreError};
use crate::services::marking::{summarize, MarkingSummary};

#[derive(Debug, Error)]
pub(crate) enum PreviewError {
    #[error("Exam not found")]
    NotFound,
    #[error("Question {index} not found (exam has {count} question(s))")]
    QuestionNotFound { index: usize, count: usize },
    #[error("Not allowed to act on this exam")]
    Forbidden,
    #[error(transparent)]
    InvalidTransition(TransitionError),
    #[error("Exam is finalized; questions and marking rules can no longer change")]
    Locked,
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Exam storage is temporarily unavailable: {0}")]
    Unavailable(String),
    #[error("Exam storage failed: {0}")]
    Storage(String),
}

impl From<StoreError> for PreviewError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::IndexOutOfRange { index, count } => Self::QuestionNotFound { index, count },
            StoreError::Locked => Self::Locked,
            StoreError::InvalidTransition(err) => Self::InvalidTransition(err),
            StoreError::Unavailable(message) => Self::Unavailable(message),
            StoreError::Backend(message) => Self::Storage(message),
        }
    }
}

/// A marking rule as a reviewer submitted it. Decoding may already have
/// failed; that failure is reported only once the exam is known to be open.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RuleCandidate(Result<MarkingRule, String>);

impl RuleCandidate {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self(Err(reason.into()))
    }

    fn into_rule(self) -> Result<MarkingRule, PreviewError> {
        let rule = self.0.map_err(PreviewError::InvalidArgument)?;
        check_mark("points", rule.points)?;
        check_mark("negativeMark", rule.negative_mark)?;
        Ok(rule)
    }
}

impl From<MarkingRule> for RuleCandidate {
    fn from(rule: MarkingRule) -> Self {
        Self(Ok(rule))
    }
}

/// Exam plus the header figures a reviewer sees above the question list.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExamView {
    pub(crate) exam: Exam,
    pub(crate) question_count: usize,
    pub(crate) total_points: Mark,
}

impl From<Exam> for ExamView {
    fn from(exam: Exam) -> Self {
        let question_count = exam.questions.len();
        let total_points = exam.questions.iter().map(|question| question.marking.points).sum();
        Self { exam, question_count, total_points }
    }
}

/// Orchestrates preview reads, state transitions and marking edits.
///
/// Holds no exam state of its own: every decision about the lock is taken
/// by the store against the row it is about to write.
#[derive(Clone)]
pub(crate) struct PreviewService {
    store: Arc<dyn ExamStore>,
    access: Arc<dyn ExamAccess>,
    policy: FinalizePolicy,
    store_timeout: Duration,
}

impl PreviewService {
    pub(crate) fn new(
        store: Arc<dyn ExamStore>,
        access: Arc<dyn ExamAccess>,
        policy: FinalizePolicy,
        store_timeout: Duration,
    ) -> Self {
        Self { store, access, policy, store_timeout }
    }

    pub(crate) async fn get_preview(
        &self,
        exam_id: &str,
        caller_id: &str,
    ) -> Result<ExamView, PreviewError> {
        let exam = self.load_authorized(exam_id, caller_id).await?;
        Ok(ExamView::from(exam))
    }

    pub(crate) async fn get_marking_stats(
        &self,
        exam_id: &str,
        caller_id: &str,
    ) -> Result<MarkingSummary, PreviewError> {
        let exam = self.load_authorized(exam_id, caller_id).await?;
        Ok(summarize(&exam.questions))
    }

    /// Current rule of one question, defaults included.
    pub(crate) async fn marking_rule(
        &self,
        exam_id: &str,
        question_index: usize,
        caller_id: &str,
    ) -> Result<MarkingRule, PreviewError> {
        let exam = self.load_authorized(exam_id, caller_id).await?;
        let count = exam.questions.len();
        exam.questions
            .get(question_index)
            .map(|question| question.marking)
            .ok_or(PreviewError::QuestionNotFound { index: question_index, count })
    }

    pub(crate) async fn start_preview(
        &self,
        exam_id: &str,
        caller_id: &str,
    ) -> Result<ExamView, PreviewError> {
        self.advance(exam_id, caller_id, PreviewState::PreviewInProgress).await
    }

    /// Repeating the call on a completed preview succeeds without writing.
    pub(crate) async fn complete_preview(
        &self,
        exam_id: &str,
        caller_id: &str,
    ) -> Result<ExamView, PreviewError> {
        self.advance(exam_id, caller_id, PreviewState::PreviewComplete).await
    }

    /// Finalizing twice succeeds; the second call changes nothing.
    pub(crate) async fn finalize_exam(
        &self,
        exam_id: &str,
        caller_id: &str,
    ) -> Result<ExamView, PreviewError> {
        self.advance(exam_id, caller_id, PreviewState::Finalized).await
    }

    pub(crate) async fn update_marking_rule(
        &self,
        exam_id: &str,
        question_index: usize,
        candidate: impl Into<RuleCandidate>,
        caller_id: &str,
    ) -> Result<MarkingSummary, PreviewError> {
        let exam = self.load_authorized(exam_id, caller_id).await?;
        if exam.preview_state.is_locked() {
            return Err(self.locked_write(exam_id, caller_id, "update_marking_rule"));
        }
        let rule = candidate.into().into_rule()?;

        let updated = self
            .bounded(self.store.replace_marking_rule(exam_id, question_index, rule, caller_id))
            .await
            .map_err(|err| match err {
                PreviewError::Locked => {
                    self.locked_write(exam_id, caller_id, "update_marking_rule")
                }
                other => other,
            })?;

        metrics::record_marking_update();
        tracing::info!(
            caller_id,
            exam_id,
            action = "update_marking_rule",
            question_index,
            points = %rule.points,
            negative_mark = %rule.negative_mark,
            partial_credit = rule.partial_credit,
            revision = updated.revision,
            "Marking rule updated"
        );

        Ok(summarize(&updated.questions))
    }

    async fn advance(
        &self,
        exam_id: &str,
        caller_id: &str,
        target: PreviewState,
    ) -> Result<ExamView, PreviewError> {
        self.load_authorized(exam_id, caller_id).await?;

        let (exam, transition) =
            self.bounded(self.store.advance_state(exam_id, target, self.policy)).await?;

        match transition {
            Transition::Advanced { from } => {
                metrics::record_transition(target);
                tracing::info!(
                    caller_id,
                    exam_id,
                    action = "advance_state",
                    from = %from,
                    to = %target,
                    "Exam preview state advanced"
                );
            }
            Transition::Unchanged => {
                tracing::debug!(
                    caller_id,
                    exam_id,
                    requested = %target,
                    current = %exam.preview_state,
                    "Exam already at or past requested state"
                );
            }
        }

        Ok(ExamView::from(exam))
    }

    /// Existence first, then authorization.
    async fn load_authorized(&self, exam_id: &str, caller_id: &str) -> Result<Exam, PreviewError> {
        let exam = self.bounded(self.store.load(exam_id)).await?;
        let allowed = self.bounded(self.access.can_act(exam_id, caller_id)).await?;
        if !allowed {
            tracing::warn!(caller_id, exam_id, "Exam access denied");
            return Err(PreviewError::Forbidden);
        }
        Ok(exam)
    }

    /// Runs one store call under the configured deadline. Expiry drops the
    /// future, which rolls back any open transaction.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, PreviewError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(PreviewError::from),
            Err(_) => Err(PreviewError::Unavailable(format!(
                "store call exceeded {} ms",
                self.store_timeout.as_millis()
            ))),
        }
    }

    fn locked_write(&self, exam_id: &str, caller_id: &str, operation: &'static str) -> PreviewError {
        metrics::record_locked_write(operation);
        tracing::warn!(caller_id, exam_id, operation, "Write rejected on finalized exam");
        PreviewError::Locked
    }
}

fn check_mark(field: &str, value: Mark) -> Result<(), PreviewError> {
    if value.is_negative() {
        return Err(PreviewError::InvalidArgument(format!("{field} must be >= 0, got {value}")));
    }
    if value > Mark::MAX {
        return Err(PreviewError::InvalidArgument(format!(
            "{field} must be <= {}, got {value}",
            Mark::MAX
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::MemoryExamStore;
    use crate::test_support::{exam_with_points, rule};

    const OWNER: &str = "owner-1";
    const EXAM: &str = "exam-1";

    async fn service_with(
        store: MemoryExamStore,
        policy: FinalizePolicy,
        timeout: Duration,
    ) -> PreviewService {
        store.insert(exam_with_points(EXAM, OWNER, &[(100, 0), (100, 25), (200, 0)])).await;
        PreviewService::new(Arc::new(store.clone()), Arc::new(store), policy, timeout)
    }

    async fn service() -> (PreviewService, MemoryExamStore) {
        let store = MemoryExamStore::new();
        let service =
            service_with(store.clone(), FinalizePolicy::default(), Duration::from_secs(5)).await;
        (service, store)
    }

    #[tokio::test]
    async fn marking_stats_for_three_questions() {
        let (service, _) = service().await;

        let summary = service.get_marking_stats(EXAM, OWNER).await.expect("stats");
        assert_eq!(summary.total_points, Mark::whole(4));
        assert_eq!(summary.average_points, Mark::from_hundredths(133));
        assert_eq!(summary.total_negative_mark, Mark::from_hundredths(25));
        assert_eq!(summary.questions_with_partial_credit, 0);
    }

    #[tokio::test]
    async fn update_returns_recomputed_summary() {
        let (service, _) = service().await;
        let before = service.get_marking_stats(EXAM, OWNER).await.expect("stats");

        let after = service
            .update_marking_rule(EXAM, 1, rule(200, 50, true), OWNER)
            .await
            .expect("update");

        assert_eq!(after.total_points, before.total_points + Mark::whole(1));
        assert_eq!(
            after.questions_with_partial_credit,
            before.questions_with_partial_credit + 1
        );
        assert_eq!(after.questions[1].negative_mark, Mark::from_hundredths(50));
        assert_eq!(after, service.get_marking_stats(EXAM, OWNER).await.expect("stats"));
    }

    #[tokio::test]
    async fn negative_points_are_rejected_and_nothing_is_stored() {
        let (service, store) = service().await;

        let err = service
            .update_marking_rule(EXAM, 0, rule(-100, 0, false), OWNER)
            .await
            .unwrap_err();
        assert!(matches!(err, PreviewError::InvalidArgument(_)));

        let err = service
            .update_marking_rule(EXAM, 0, rule(100, -1, false), OWNER)
            .await
            .unwrap_err();
        assert!(matches!(err, PreviewError::InvalidArgument(_)));

        let exam = store.snapshot(EXAM).await.expect("exam");
        assert_eq!(exam.questions[0].marking, rule(100, 0, false));
        assert_eq!(exam.revision, 0);
    }

    #[tokio::test]
    async fn oversized_marks_are_rejected() {
        let (service, _) = service().await;

        let too_big = Mark::MAX.hundredths() + 1;
        let err = service
            .update_marking_rule(EXAM, 0, rule(too_big, 0, false), OWNER)
            .await
            .unwrap_err();
        assert!(matches!(err, PreviewError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn finalize_locks_every_later_edit() {
        let (service, store) = service().await;

        let view = service.finalize_exam(EXAM, OWNER).await.expect("finalize");
        assert_eq!(view.exam.preview_state, PreviewState::Finalized);
        assert!(view.exam.finalized_at.is_some());

        for index in 0..3 {
            let err = service
                .update_marking_rule(EXAM, index, rule(500, 0, false), OWNER)
                .await
                .unwrap_err();
            assert!(matches!(err, PreviewError::Locked));
        }
        // Even an invalid rule reports the lock first.
        let err = service
            .update_marking_rule(EXAM, 0, rule(-100, 0, false), OWNER)
            .await
            .unwrap_err();
        assert!(matches!(err, PreviewError::Locked));

        let missing = RuleCandidate::malformed("missing field `points`");
        let err = service.update_marking_rule(EXAM, 0, missing, OWNER).await.unwrap_err();
        assert!(matches!(err, PreviewError::Locked));

        let exam = store.snapshot(EXAM).await.expect("exam");
        assert_eq!(exam.questions[2].marking, rule(200, 0, false));
    }

    #[tokio::test]
    async fn malformed_candidate_on_open_exam_is_invalid_argument() {
        let (service, store) = service().await;

        let missing = RuleCandidate::malformed("missing field `points`");
        let err = service.update_marking_rule(EXAM, 0, missing, OWNER).await.unwrap_err();
        assert!(
            matches!(err, PreviewError::InvalidArgument(ref message) if message.contains("points"))
        );
        assert_eq!(store.snapshot(EXAM).await.expect("exam").revision, 0);
    }

    #[tokio::test]
    async fn finalize_twice_is_a_noop() {
        let (service, _) = service().await;

        let first = service.finalize_exam(EXAM, OWNER).await.expect("first");
        let second = service.finalize_exam(EXAM, OWNER).await.expect("second");
        assert_eq!(second.exam.preview_state, PreviewState::Finalized);
        assert_eq!(second.exam.revision, first.exam.revision);
        assert_eq!(second.exam.finalized_at, first.exam.finalized_at);
    }

    #[tokio::test]
    async fn complete_preview_twice_from_draft() {
        let (service, _) = service().await;

        let first = service.complete_preview(EXAM, OWNER).await.expect("first");
        let second = service.complete_preview(EXAM, OWNER).await.expect("second");
        assert_eq!(first.exam.preview_state, PreviewState::PreviewComplete);
        assert_eq!(second.exam.preview_state, PreviewState::PreviewComplete);
        assert_eq!(second.exam.revision, first.exam.revision);
    }

    #[tokio::test]
    async fn complete_preview_after_finalize_is_invalid() {
        let (service, _) = service().await;
        service.finalize_exam(EXAM, OWNER).await.expect("finalize");

        let err = service.complete_preview(EXAM, OWNER).await.unwrap_err();
        assert!(matches!(err, PreviewError::InvalidTransition(TransitionError::Finalized { .. })));
        let err = service.start_preview(EXAM, OWNER).await.unwrap_err();
        assert!(matches!(err, PreviewError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn start_after_completion_is_a_noop() {
        let (service, _) = service().await;

        let started = service.start_preview(EXAM, OWNER).await.expect("start");
        assert_eq!(started.exam.preview_state, PreviewState::PreviewInProgress);
        assert!(started.exam.preview_started_at.is_some());

        service.complete_preview(EXAM, OWNER).await.expect("complete");
        let again = service.start_preview(EXAM, OWNER).await.expect("start again");
        assert_eq!(again.exam.preview_state, PreviewState::PreviewComplete);
    }

    #[tokio::test]
    async fn strict_policy_blocks_finalize_without_completed_preview() {
        let store = MemoryExamStore::new();
        let strict = FinalizePolicy { require_completed_preview: true };
        let service = service_with(store, strict, Duration::from_secs(5)).await;

        let err = service.finalize_exam(EXAM, OWNER).await.unwrap_err();
        assert!(matches!(
            err,
            PreviewError::InvalidTransition(TransitionError::PreviewNotCompleted { .. })
        ));

        service.complete_preview(EXAM, OWNER).await.expect("complete");
        let view = service.finalize_exam(EXAM, OWNER).await.expect("finalize");
        assert_eq!(view.exam.preview_state, PreviewState::Finalized);
    }

    #[tokio::test]
    async fn preview_reports_header_totals_without_changing_state() {
        let (service, _) = service().await;

        let view = service.get_preview(EXAM, OWNER).await.expect("preview");
        assert_eq!(view.question_count, 3);
        assert_eq!(view.total_points, Mark::whole(4));
        assert_eq!(view.exam.preview_state, PreviewState::Draft);
        assert_eq!(view.exam.revision, 0);
    }

    #[tokio::test]
    async fn missing_exam_and_foreign_caller() {
        let (service, store) = service().await;

        assert!(matches!(service.get_preview("nope", OWNER).await, Err(PreviewError::NotFound)));
        assert!(matches!(
            service.get_marking_stats(EXAM, "stranger").await,
            Err(PreviewError::Forbidden)
        ));
        assert!(matches!(
            service.finalize_exam(EXAM, "stranger").await,
            Err(PreviewError::Forbidden)
        ));
        assert_eq!(store.snapshot(EXAM).await.expect("exam").preview_state, PreviewState::Draft);

        store.add_reviewer(EXAM, "reviewer-1").await;
        assert!(service.get_preview(EXAM, "reviewer-1").await.is_ok());
    }

    #[tokio::test]
    async fn out_of_range_question_is_not_found() {
        let (service, _) = service().await;

        let err = service
            .update_marking_rule(EXAM, 3, rule(100, 0, false), OWNER)
            .await
            .unwrap_err();
        assert!(matches!(err, PreviewError::QuestionNotFound { index: 3, count: 3 }));

        let err = service.marking_rule(EXAM, 7, OWNER).await.unwrap_err();
        assert!(matches!(err, PreviewError::QuestionNotFound { index: 7, count: 3 }));
    }

    #[tokio::test]
    async fn slow_store_surfaces_as_unavailable() {
        let store = MemoryExamStore::with_latency(Duration::from_millis(200));
        let service =
            service_with(store, FinalizePolicy::default(), Duration::from_millis(20)).await;

        let err = service.get_preview(EXAM, OWNER).await.unwrap_err();
        assert!(matches!(err, PreviewError::Unavailable(_)));
    }
}
