use sqlx::FromRow;
use vorder_core::allocation::{ServiceLoad, ServiceStatus, VirtualService};
use vorder_core::store::StoreError;
use vorder_core::types::{DbId, Timestamp};

/// A row from the `virtual_services` table.
#[derive(Debug, Clone, FromRow)]
pub struct ServiceRow {
    pub id: DbId,
    pub user_id: DbId,
    pub name: String,
    pub account: String,
    pub status: String,
    pub created_at: Timestamp,
}

impl TryFrom<ServiceRow> for VirtualService {
    type Error = StoreError;

    fn try_from(row: ServiceRow) -> Result<Self, Self::Error> {
        let status: ServiceStatus = row.status.parse().map_err(|e: String| {
            StoreError::Corrupt(format!("virtual_services {}: {e}", row.id))
        })?;
        Ok(VirtualService {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            account: row.account,
            status,
            created_at: row.created_at,
        })
    }
}

/// An active identity joined with its open-task count.
#[derive(Debug, Clone, FromRow)]
pub struct ServiceLoadRow {
    pub id: DbId,
    pub user_id: DbId,
    pub name: String,
    pub created_at: Timestamp,
    pub current_task_count: i64,
}

impl From<ServiceLoadRow> for ServiceLoad {
    fn from(row: ServiceLoadRow) -> Self {
        ServiceLoad {
            service_id: row.id,
            user_id: row.user_id,
            name: row.name,
            created_at: row.created_at,
            current_task_count: row.current_task_count,
        }
    }
}
