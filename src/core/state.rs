use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::db::types::FinalizePolicy;
use crate::repositories::exam_access::PgExamAccess;
use crate::repositories::exams::PgExamStore;
use crate::services::preview::PreviewService;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    preview: PreviewService,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        preview: PreviewService,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, redis, preview }) }
    }

    /// Wires the preview service to Postgres-backed store and access checks.
    pub(crate) fn with_postgres(settings: Settings, db: PgPool, redis: RedisHandle) -> Self {
        let preview_settings = settings.preview();
        let preview = PreviewService::new(
            Arc::new(PgExamStore::new(db.clone())),
            Arc::new(PgExamAccess::new(db.clone())),
            FinalizePolicy { require_completed_preview: preview_settings.require_completed_preview },
            preview_settings.store_timeout(),
        );
        Self::new(settings, db, redis, preview)
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn preview(&self) -> &PreviewService {
        &self.inner.preview
    }
}
