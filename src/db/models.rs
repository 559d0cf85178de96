use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{Mark, PreviewState};

/// An exam as owned by the preview store: header row plus its ordered questions.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) owner_id: String,
    pub(crate) preview_state: PreviewState,
    pub(crate) revision: i64,
    pub(crate) questions: Vec<Question>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) preview_started_at: Option<PrimitiveDateTime>,
    pub(crate) preview_completed_at: Option<PrimitiveDateTime>,
    pub(crate) finalized_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) options: Vec<QuestionOption>,
    pub(crate) marking: MarkingRule,
}

/// Answer option as produced by the authoring side; stored as JSONB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct QuestionOption {
    pub(crate) letter: String,
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MarkingRule {
    pub(crate) points: Mark,
    pub(crate) negative_mark: Mark,
    pub(crate) partial_credit: bool,
}

impl Default for MarkingRule {
    fn default() -> Self {
        Self { points: Mark::whole(1), negative_mark: Mark::ZERO, partial_credit: false }
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ExamRow {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) owner_id: String,
    pub(crate) preview_state: PreviewState,
    pub(crate) revision: i64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) preview_started_at: Option<PrimitiveDateTime>,
    pub(crate) preview_completed_at: Option<PrimitiveDateTime>,
    pub(crate) finalized_at: Option<PrimitiveDateTime>,
}

/// Question joined with its optional marking rule row.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct QuestionRow {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) options: Json<Vec<QuestionOption>>,
    pub(crate) points: Option<Mark>,
    pub(crate) negative_mark: Option<Mark>,
    pub(crate) partial_credit: Option<bool>,
}

impl ExamRow {
    pub(crate) fn into_exam(self, questions: Vec<QuestionRow>) -> Exam {
        Exam {
            id: self.id,
            title: self.title,
            owner_id: self.owner_id,
            preview_state: self.preview_state,
            revision: self.revision,
            questions: questions.into_iter().map(QuestionRow::into_question).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            preview_started_at: self.preview_started_at,
            preview_completed_at: self.preview_completed_at,
            finalized_at: self.finalized_at,
        }
    }
}

impl QuestionRow {
    fn into_question(self) -> Question {
        let marking = match (self.points, self.negative_mark, self.partial_credit) {
            (Some(points), Some(negative_mark), Some(partial_credit)) => {
                MarkingRule { points, negative_mark, partial_credit }
            }
            _ => MarkingRule::default(),
        };

        Question { id: self.id, text: self.text, options: self.options.0, marking }
    }
}
