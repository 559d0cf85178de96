use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use time::PrimitiveDateTime;

use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, ExamRow, MarkingRule};
use crate::db::types::{FinalizePolicy, PreviewState, Transition};
use crate::repositories::{questions, ExamStore, StoreError};

pub(crate) const COLUMNS: &str = "\
    id, title, owner_id, preview_state, revision, created_at, updated_at, \
    preview_started_at, preview_completed_at, finalized_at";

pub(crate) async fn find_by_id(
    conn: &mut PgConnection,
    id: &str,
) -> Result<Option<ExamRow>, sqlx::Error> {
    sqlx::query_as::<_, ExamRow>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await
}

/// Row-locks the exam for the rest of the transaction and returns its state.
pub(crate) async fn lock_state(
    conn: &mut PgConnection,
    id: &str,
) -> Result<Option<PreviewState>, sqlx::Error> {
    sqlx::query_scalar("SELECT preview_state FROM exams WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub(crate) async fn touch(
    conn: &mut PgConnection,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE exams SET revision = revision + 1, updated_at = $1 WHERE id = $2")
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn set_state(
    conn: &mut PgConnection,
    id: &str,
    target: PreviewState,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    let stamp = match transition_column(target) {
        Some(column) => format!(", {column} = $2"),
        None => String::new(),
    };

    sqlx::query(&format!(
        "UPDATE exams
         SET preview_state = $1, updated_at = $2, revision = revision + 1{stamp}
         WHERE id = $3"
    ))
    .bind(target)
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}

fn transition_column(target: PreviewState) -> Option<&'static str> {
    match target {
        PreviewState::Draft => None,
        PreviewState::PreviewInProgress => Some("preview_started_at"),
        PreviewState::PreviewComplete => Some("preview_completed_at"),
        PreviewState::Finalized => Some("finalized_at"),
    }
}

async fn load_exam(conn: &mut PgConnection, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    let Some(row) = find_by_id(&mut *conn, id).await? else {
        return Ok(None);
    };
    let question_rows = questions::list_by_exam(&mut *conn, id).await?;
    Ok(Some(row.into_exam(question_rows)))
}

/// Postgres-backed [`ExamStore`].
#[derive(Clone)]
pub(crate) struct PgExamStore {
    pool: PgPool,
}

impl PgExamStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExamStore for PgExamStore {
    async fn load(&self, exam_id: &str) -> Result<Exam, StoreError> {
        let mut tx = self.pool.begin().await?;
        // Header and questions must come from one snapshot.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let exam = load_exam(&mut tx, exam_id).await?.ok_or(StoreError::NotFound)?;
        tx.commit().await?;
        Ok(exam)
    }

    async fn replace_marking_rule(
        &self,
        exam_id: &str,
        question_index: usize,
        rule: MarkingRule,
        editor_id: &str,
    ) -> Result<Exam, StoreError> {
        let mut tx = self.pool.begin().await?;

        let state = lock_state(&mut tx, exam_id).await?.ok_or(StoreError::NotFound)?;
        if state.is_locked() {
            return Err(StoreError::Locked);
        }

        let question_id = match i64::try_from(question_index) {
            Ok(offset) => questions::find_id_at(&mut tx, exam_id, offset).await?,
            Err(_) => None,
        };
        let Some(question_id) = question_id else {
            let count = questions::count_by_exam(&mut tx, exam_id).await?;
            return Err(StoreError::IndexOutOfRange {
                index: question_index,
                count: usize::try_from(count).unwrap_or_default(),
            });
        };

        let now = primitive_now_utc();
        questions::upsert_marking_rule(
            &mut tx,
            questions::UpsertMarkingRule {
                question_id: &question_id,
                rule,
                updated_by: editor_id,
                updated_at: now,
            },
        )
        .await?;
        touch(&mut tx, exam_id, now).await?;

        let exam = load_exam(&mut tx, exam_id).await?.ok_or(StoreError::NotFound)?;
        tx.commit().await?;
        Ok(exam)
    }

    async fn advance_state(
        &self,
        exam_id: &str,
        target: PreviewState,
        policy: FinalizePolicy,
    ) -> Result<(Exam, Transition), StoreError> {
        let mut tx = self.pool.begin().await?;

        let current = lock_state(&mut tx, exam_id).await?.ok_or(StoreError::NotFound)?;
        let transition = current.plan(target, policy)?;
        if matches!(transition, Transition::Advanced { .. }) {
            set_state(&mut tx, exam_id, target, primitive_now_utc()).await?;
        }

        let exam = load_exam(&mut tx, exam_id).await?.ok_or(StoreError::NotFound)?;
        tx.commit().await?;
        Ok((exam, transition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::Mark;
    use crate::test_support;

    #[test]
    fn each_forward_target_stamps_its_own_column() {
        assert_eq!(transition_column(PreviewState::Draft), None);
        assert_eq!(transition_column(PreviewState::PreviewInProgress), Some("preview_started_at"));
        assert_eq!(transition_column(PreviewState::PreviewComplete), Some("preview_completed_at"));
        assert_eq!(transition_column(PreviewState::Finalized), Some("finalized_at"));
    }

    #[tokio::test]
    async fn pg_store_enforces_lock_inside_transaction() {
        let Some(pool) = test_support::test_pool().await else {
            return;
        };
        let exam_id = test_support::insert_pg_exam(&pool, "owner-1", 3).await;
        let store = PgExamStore::new(pool);

        let rule = MarkingRule {
            points: Mark::whole(2),
            negative_mark: Mark::from_hundredths(50),
            partial_credit: true,
        };
        let exam = store.replace_marking_rule(&exam_id, 1, rule, "owner-1").await.expect("edit");
        assert_eq!(exam.questions[1].marking, rule);
        assert_eq!(exam.revision, 1);

        let (exam, transition) = store
            .advance_state(&exam_id, PreviewState::Finalized, FinalizePolicy::default())
            .await
            .expect("finalize");
        assert_eq!(transition, Transition::Advanced { from: PreviewState::Draft });
        assert!(exam.finalized_at.is_some());
        assert!(exam.preview_completed_at.is_none());

        let err = store
            .replace_marking_rule(&exam_id, 0, MarkingRule::default(), "owner-1")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Locked));

        let reloaded = store.load(&exam_id).await.expect("load");
        assert_eq!(reloaded.questions[1].marking, rule);
        assert_eq!(reloaded.questions[0].marking, MarkingRule::default());
    }

    #[tokio::test]
    async fn pg_store_reports_out_of_range_index() {
        let Some(pool) = test_support::test_pool().await else {
            return;
        };
        let exam_id = test_support::insert_pg_exam(&pool, "owner-2", 1).await;
        let store = PgExamStore::new(pool);

        let err = store
            .replace_marking_rule(&exam_id, 3, MarkingRule::default(), "owner-2")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IndexOutOfRange { index: 3, count: 1 }));

        assert!(matches!(store.load("missing-exam").await, Err(StoreError::NotFound)));
    }
}
