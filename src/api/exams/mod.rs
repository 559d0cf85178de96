mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:exam_id/preview", get(handlers::get_preview))
        .route("/:exam_id/preview/start", post(handlers::start_preview))
        .route("/:exam_id/preview/complete", post(handlers::complete_preview))
        .route("/:exam_id/finalize", post(handlers::finalize_exam))
        .route("/:exam_id/marking-stats", get(handlers::get_marking_stats))
        .route(
            "/:exam_id/questions/:question_index/marking",
            get(handlers::get_marking_rule).put(handlers::update_marking_rule),
        )
}
