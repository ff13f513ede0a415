//! Repository for the `system_config` key/value table.

use sqlx::PgConnection;

pub struct ConfigRepo;

impl ConfigRepo {
    pub async fn all(conn: &mut PgConnection) -> Result<Vec<(String, String)>, sqlx::Error> {
        sqlx::query_as::<_, (String, String)>(
            "SELECT config_key, config_value FROM system_config ORDER BY config_key",
        )
        .fetch_all(&mut *conn)
        .await
    }

    pub async fn upsert(
        conn: &mut PgConnection,
        key: &str,
        value: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO system_config (config_key, config_value) VALUES ($1, $2) \
             ON CONFLICT ON CONSTRAINT uq_system_config_key DO UPDATE SET \
                config_value = EXCLUDED.config_value, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
