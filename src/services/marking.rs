//! Marking-scheme statistics derived from per-question rules.
//!
//! Nothing here is stored. A summary is recomputed from the question list on
//! every read, in fixed-point arithmetic, so equal input always yields equal
//! output.

use serde::Serialize;

use crate::db::models::Question;
use crate::db::types::Mark;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MarkingSummary {
    pub(crate) total_points: Mark,
    pub(crate) average_points: Mark,
    pub(crate) questions_with_partial_credit: usize,
    pub(crate) total_negative_mark: Mark,
    pub(crate) questions: Vec<QuestionMarking>,
}

/// One entry per question, in exam order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionMarking {
    pub(crate) index: usize,
    pub(crate) question_id: String,
    pub(crate) points: Mark,
    pub(crate) negative_mark: Mark,
    pub(crate) partial_credit: bool,
}

pub(crate) fn summarize(questions: &[Question]) -> MarkingSummary {
    let breakdown: Vec<QuestionMarking> = questions
        .iter()
        .enumerate()
        .map(|(index, question)| QuestionMarking {
            index,
            question_id: question.id.clone(),
            points: question.marking.points,
            negative_mark: question.marking.negative_mark,
            partial_credit: question.marking.partial_credit,
        })
        .collect();

    let total_points: Mark = breakdown.iter().map(|entry| entry.points).sum();
    let total_negative_mark: Mark = breakdown.iter().map(|entry| entry.negative_mark).sum();
    let questions_with_partial_credit =
        breakdown.iter().filter(|entry| entry.partial_credit).count();

    MarkingSummary {
        total_points,
        average_points: total_points.div_round(breakdown.len()),
        questions_with_partial_credit,
        total_negative_mark,
        questions: breakdown,
    }
}
