use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::core::time::format_primitive;
use crate::db::models::{MarkingRule, Question};
use crate::db::types::{Mark, MarkError, PreviewState};
use crate::services::marking::MarkingSummary;
use crate::services::preview::{ExamView, RuleCandidate};

/// Body of `PUT /exams/{id}/questions/{idx}/marking`.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct MarkingRuleUpdate {
    #[validate(custom(function = "validate_mark"))]
    pub(crate) points: f64,
    #[serde(default)]
    #[serde(alias = "negativeMark")]
    #[validate(custom(function = "validate_mark"))]
    pub(crate) negative_mark: f64,
    #[serde(default)]
    #[serde(alias = "partialCredit")]
    pub(crate) partial_credit: bool,
}

// Sign and upper bound are checked by the preview service, after the lock.
fn validate_mark(value: f64) -> Result<(), ValidationError> {
    Mark::from_decimal(value).map(|_| ()).map_err(|err| {
        let mut error = ValidationError::new("mark");
        error.message = Some(err.to_string().into());
        error
    })
}

impl MarkingRuleUpdate {
    pub(crate) fn into_rule(self) -> Result<MarkingRule, MarkError> {
        Ok(MarkingRule {
            points: Mark::from_decimal(self.points)?,
            negative_mark: Mark::from_decimal(self.negative_mark)?,
            partial_credit: self.partial_credit,
        })
    }
}

impl From<MarkingRuleUpdate> for RuleCandidate {
    fn from(update: MarkingRuleUpdate) -> Self {
        let checked = update.validate().map_err(|err| err.to_string());
        match checked.and_then(|()| update.into_rule().map_err(|err| err.to_string())) {
            Ok(rule) => RuleCandidate::from(rule),
            Err(reason) => RuleCandidate::malformed(reason),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExamPreview {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) preview_state: PreviewState,
    pub(crate) is_locked: bool,
    pub(crate) revision: i64,
    pub(crate) question_count: usize,
    pub(crate) total_points: Mark,
    pub(crate) questions: Vec<QuestionPreview>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) preview_started_at: Option<String>,
    pub(crate) preview_completed_at: Option<String>,
    pub(crate) finalized_at: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionPreview {
    pub(crate) index: usize,
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) options: Vec<OptionPreview>,
    pub(crate) marking: MarkingRule,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OptionPreview {
    pub(crate) letter: String,
    pub(crate) text: String,
    pub(crate) is_correct: bool,
}

impl From<ExamView> for ExamPreview {
    fn from(view: ExamView) -> Self {
        let exam = view.exam;
        Self {
            id: exam.id,
            title: exam.title,
            preview_state: exam.preview_state,
            is_locked: exam.preview_state.is_locked(),
            revision: exam.revision,
            question_count: view.question_count,
            total_points: view.total_points,
            questions: exam.questions.into_iter().enumerate().map(QuestionPreview::from).collect(),
            created_at: format_primitive(exam.created_at),
            updated_at: format_primitive(exam.updated_at),
            preview_started_at: exam.preview_started_at.map(format_primitive),
            preview_completed_at: exam.preview_completed_at.map(format_primitive),
            finalized_at: exam.finalized_at.map(format_primitive),
        }
    }
}

impl From<(usize, Question)> for QuestionPreview {
    fn from((index, question): (usize, Question)) -> Self {
        Self {
            index,
            id: question.id,
            text: question.text,
            options: question
                .options
                .into_iter()
                .map(|option| OptionPreview {
                    letter: option.letter,
                    text: option.text,
                    is_correct: option.is_correct,
                })
                .collect(),
            marking: question.marking,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PreviewResponse {
    pub(crate) preview: ExamPreview,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MarkingStatsResponse {
    pub(crate) marking_scheme: MarkingSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MarkingRuleResponse {
    pub(crate) question_index: usize,
    pub(crate) marking: MarkingRule,
}
