//! Read-only lookups against the platform's `students` and `agents` tables.

use sqlx::PgConnection;
use vorder_core::types::DbId;

pub struct StudentRepo;

impl StudentRepo {
    /// Raw rebate setting of the student's agent. `None` when the student
    /// has no live agent or the agent has no rebate configured.
    pub async fn agent_rebate(
        conn: &mut PgConnection,
        student_id: DbId,
    ) -> Result<Option<String>, sqlx::Error> {
        let raw = sqlx::query_scalar::<_, Option<String>>(
            "SELECT a.agent_rebate \
             FROM students s \
             JOIN agents a ON a.id = s.agent_id \
             WHERE s.id = $1 AND NOT s.is_deleted AND NOT a.is_deleted",
        )
        .bind(student_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(raw.flatten())
    }
}
