use async_trait::async_trait;
use sqlx::PgPool;

use crate::repositories::{ExamAccess, StoreError};

/// Grants access to the exam owner and to anyone listed in `exam_reviewers`.
#[derive(Clone)]
pub(crate) struct PgExamAccess {
    pool: PgPool,
}

impl PgExamAccess {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) async fn is_owner_or_reviewer(
    pool: &PgPool,
    exam_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT 1 FROM exams WHERE id = $1 AND owner_id = $2
         ) OR EXISTS (
            SELECT 1 FROM exam_reviewers WHERE exam_id = $1 AND user_id = $2
         )",
    )
    .bind(exam_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
}

#[async_trait]
impl ExamAccess for PgExamAccess {
    async fn can_act(&self, exam_id: &str, caller_id: &str) -> Result<bool, StoreError> {
        Ok(is_owner_or_reviewer(&self.pool, exam_id, caller_id).await?)
    }
}
