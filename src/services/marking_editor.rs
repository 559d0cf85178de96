use crate::db::models::MarkingRule;
use crate::services::marking::MarkingSummary;
use crate::services::preview::{PreviewError, PreviewService, RuleCandidate};

/// A reviewer's editing session for one exam.
///
/// Which question is open lives here, per session, and never in shared
/// state. Candidate rules go to the service untouched and its answer comes
/// back untouched.
pub(crate) struct MarkingEditor<'a> {
    service: &'a PreviewService,
    exam_id: &'a str,
    caller_id: &'a str,
    editing: Option<usize>,
}

impl<'a> MarkingEditor<'a> {
    pub(crate) fn new(service: &'a PreviewService, exam_id: &'a str, caller_id: &'a str) -> Self {
        Self { service, exam_id, caller_id, editing: None }
    }

    #[cfg(test)]
    pub(crate) fn editing(&self) -> Option<usize> {
        self.editing
    }

    /// Selects a question without reading it.
    pub(crate) fn select(&mut self, question_index: usize) {
        self.editing = Some(question_index);
    }

    /// Loads the current rule of `question_index` and keeps it selected.
    pub(crate) async fn open(&mut self, question_index: usize) -> Result<MarkingRule, PreviewError> {
        let rule = self.service.marking_rule(self.exam_id, question_index, self.caller_id).await?;
        self.editing = Some(question_index);
        Ok(rule)
    }

    /// Sends `rule` for the selected question. The session closes on success
    /// and stays on the same question on failure.
    pub(crate) async fn submit(
        &mut self,
        rule: impl Into<RuleCandidate>,
    ) -> Result<MarkingSummary, PreviewError> {
        let Some(question_index) = self.editing else {
            return Err(PreviewError::InvalidArgument("No question is open for editing".into()));
        };

        let summary = self
            .service
            .update_marking_rule(self.exam_id, question_index, rule, self.caller_id)
            .await?;
        self.editing = None;
        Ok(summary)
    }

    #[cfg(test)]
    pub(crate) fn close(&mut self) {
        self.editing = None;
    }
}
