//! Repository for `resource_images` and `resource_categories`.

use sqlx::PgConnection;
use vorder_core::types::DbId;

use crate::models::resource::{CategoryRow, ImageRow};

pub struct ImageRepo;

impl ImageRepo {
    /// Claim one available image, skipping rows other transactions hold.
    ///
    /// With `category` set only images of that category qualify.
    pub async fn claim_available(
        conn: &mut PgConnection,
        category: Option<&str>,
    ) -> Result<Option<ImageRow>, sqlx::Error> {
        sqlx::query_as::<_, ImageRow>(
            "UPDATE resource_images \
             SET usage_status = 'used', used_at = NOW() \
             WHERE id = ( \
                 SELECT i.id FROM resource_images i \
                 LEFT JOIN resource_categories c ON c.id = i.category_id \
                 WHERE i.usage_status = 'available' \
                   AND ($1::TEXT IS NULL OR c.category_code = $1) \
                 ORDER BY i.id \
                 LIMIT 1 \
                 FOR UPDATE OF i SKIP LOCKED \
             ) \
             RETURNING id, \
                 (SELECT category_code FROM resource_categories \
                  WHERE resource_categories.id = resource_images.category_id) AS category_code, \
                 file_url",
        )
        .bind(category)
        .fetch_optional(&mut *conn)
        .await
    }

    pub async fn attach(
        conn: &mut PgConnection,
        image_id: DbId,
        task_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE resource_images SET used_in_task_id = $2 WHERE id = $1")
            .bind(image_id)
            .bind(task_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Detach images from the given tasks and return them to the library.
    pub async fn release_for_tasks(
        conn: &mut PgConnection,
        task_ids: &[DbId],
    ) -> Result<u64, sqlx::Error> {
        if task_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE resource_images \
             SET used_in_task_id = NULL, usage_status = 'available', used_at = NULL \
             WHERE used_in_task_id = ANY($1)",
        )
        .bind(task_ids)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn active_categories(
        conn: &mut PgConnection,
    ) -> Result<Vec<CategoryRow>, sqlx::Error> {
        sqlx::query_as::<_, CategoryRow>(
            "SELECT category_code, weight FROM resource_categories \
             WHERE is_active \
             ORDER BY sort_order, id",
        )
        .fetch_all(&mut *conn)
        .await
    }
}
