use sqlx::PgConnection;
use time::PrimitiveDateTime;

use crate::db::models::{MarkingRule, QuestionRow};

/// Question columns joined with its optional marking row (`q` and `r`).
pub(crate) const COLUMNS: &str = "\
    q.id, q.text, q.options, r.points, r.negative_mark, r.partial_credit";

pub(crate) async fn list_by_exam(
    conn: &mut PgConnection,
    exam_id: &str,
) -> Result<Vec<QuestionRow>, sqlx::Error> {
    sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {COLUMNS} FROM exam_questions q \
         LEFT JOIN marking_rules r ON r.question_id = q.id \
         WHERE q.exam_id = $1 ORDER BY q.position"
    ))
    .bind(exam_id)
    .fetch_all(conn)
    .await
}

/// Id of the question at 0-based `index` in exam order.
pub(crate) async fn find_id_at(
    conn: &mut PgConnection,
    exam_id: &str,
    index: i64,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT id FROM exam_questions WHERE exam_id = $1 ORDER BY position OFFSET $2 LIMIT 1",
    )
    .bind(exam_id)
    .bind(index)
    .fetch_optional(conn)
    .await
}

pub(crate) async fn count_by_exam(
    conn: &mut PgConnection,
    exam_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM exam_questions WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(conn)
        .await
}

pub(crate) struct UpsertMarkingRule<'a> {
    pub(crate) question_id: &'a str,
    pub(crate) rule: MarkingRule,
    pub(crate) updated_by: &'a str,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn upsert_marking_rule(
    conn: &mut PgConnection,
    params: UpsertMarkingRule<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO marking_rules (
            question_id, points, negative_mark, partial_credit, updated_by, updated_at
         ) VALUES ($1,$2,$3,$4,$5,$6)
         ON CONFLICT (question_id) DO UPDATE SET
            points = EXCLUDED.points,
            negative_mark = EXCLUDED.negative_mark,
            partial_credit = EXCLUDED.partial_credit,
            updated_by = EXCLUDED.updated_by,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(params.question_id)
    .bind(params.rule.points)
    .bind(params.rule.negative_mark)
    .bind(params.rule.partial_credit)
    .bind(params.updated_by)
    .bind(params.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}
