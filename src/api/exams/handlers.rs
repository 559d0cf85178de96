use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::{enforce_marking_rate_limit, CurrentUser};
use crate::core::state::AppState;
use crate::schemas::exam::{
    ExamPreview, MarkingRuleResponse, MarkingRuleUpdate, MarkingStatsResponse, PreviewResponse,
};
use crate::services::marking_editor::MarkingEditor;
use crate::services::preview::RuleCandidate;

pub(super) async fn get_preview(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let view = state.preview().get_preview(&exam_id, &user.id).await?;
    Ok(Json(PreviewResponse { preview: ExamPreview::from(view) }))
}

pub(super) async fn get_marking_stats(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<MarkingStatsResponse>, ApiError> {
    let summary = state.preview().get_marking_stats(&exam_id, &user.id).await?;
    Ok(Json(MarkingStatsResponse { marking_scheme: summary }))
}

pub(super) async fn start_preview(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ExamPreview>, ApiError> {
    let view = state.preview().start_preview(&exam_id, &user.id).await?;
    Ok(Json(ExamPreview::from(view)))
}

pub(super) async fn complete_preview(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ExamPreview>, ApiError> {
    let view = state.preview().complete_preview(&exam_id, &user.id).await?;
    Ok(Json(ExamPreview::from(view)))
}

pub(super) async fn finalize_exam(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ExamPreview>, ApiError> {
    let view = state.preview().finalize_exam(&exam_id, &user.id).await?;
    Ok(Json(ExamPreview::from(view)))
}

pub(super) async fn get_marking_rule(
    user: CurrentUser,
    State(state): State<AppState>,
    Path((exam_id, question_index)): Path<(String, usize)>,
) -> Result<Json<MarkingRuleResponse>, ApiError> {
    let mut editor = MarkingEditor::new(state.preview(), &exam_id, &user.id);
    let marking = editor.open(question_index).await?;
    Ok(Json(MarkingRuleResponse { question_index, marking }))
}

pub(super) async fn update_marking_rule(
    user: CurrentUser,
    State(state): State<AppState>,
    Path((exam_id, question_index)): Path<(String, usize)>,
    payload: Result<Json<MarkingRuleUpdate>, JsonRejection>,
) -> Result<Json<MarkingStatsResponse>, ApiError> {
    enforce_marking_rate_limit(&state, &user).await?;
    // A bad body is only reported once the service has ruled out the lock.
    let candidate = match payload {
        Ok(Json(update)) => RuleCandidate::from(update),
        Err(rejection) => RuleCandidate::malformed(rejection.body_text()),
    };

    let mut editor = MarkingEditor::new(state.preview(), &exam_id, &user.id);
    editor.select(question_index);
    let summary = editor.submit(candidate).await?;

    Ok(Json(MarkingStatsResponse { marking_scheme: summary }))
}
