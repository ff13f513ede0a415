//! Administration of virtual customer-service identities.

use serde::Serialize;
use vorder_core::allocation::{
    rank, round_robin, NewVirtualService, ServiceStatus, UpdateVirtualService, VirtualService,
};
use vorder_core::error::CoreError;
use vorder_core::types::DbId;

use crate::{EngineResult, VirtualOrderEngine};

#[derive(Debug, Clone, Serialize)]
pub struct ServiceDeletion {
    pub service: VirtualService,
    /// Unaccepted tasks moved to the remaining identities.
    pub reassigned_tasks: usize,
    /// Unaccepted tasks left on the deleted identity for lack of another.
    pub orphaned_tasks: usize,
}

fn validate_new(new: &NewVirtualService) -> Result<(), CoreError> {
    if new.name.trim().is_empty() {
        return Err(CoreError::Validation("name must not be empty".into()));
    }
    if new.account.trim().is_empty() {
        return Err(CoreError::Validation("account must not be empty".into()));
    }
    Ok(())
}

impl VirtualOrderEngine {
    pub async fn list_services(&self) -> EngineResult<Vec<VirtualService>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_services().await?)
    }

    pub async fn get_service(&self, service_id: DbId) -> EngineResult<VirtualService> {
        let mut tx = self.store.begin().await?;
        Ok(tx.find_service(service_id).await?.ok_or(CoreError::NotFound {
            entity: "virtual_service",
            id: service_id,
        })?)
    }

    pub async fn create_service(&self, new: &NewVirtualService) -> EngineResult<VirtualService> {
        validate_new(new)?;
        let mut tx = self.store.begin().await?;
        if tx
            .list_services()
            .await?
            .iter()
            .any(|s| s.account == new.account)
        {
            return Err(CoreError::Conflict(format!(
                "Virtual service account '{}' already exists",
                new.account
            ))
            .into());
        }
        let service = tx.insert_service(new).await?;
        tx.commit().await?;

        tracing::info!(
            service_id = service.id,
            account = %service.account,
            "Virtual service created"
        );
        Ok(service)
    }

    pub async fn update_service(
        &self,
        service_id: DbId,
        update: &UpdateVirtualService,
    ) -> EngineResult<VirtualService> {
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(CoreError::Validation("name must not be empty".into()).into());
        }
        let mut tx = self.store.begin().await?;
        let service = tx
            .update_service(service_id, update)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "virtual_service",
                id: service_id,
            })?;
        tx.commit().await?;

        if service.status == ServiceStatus::Inactive {
            tracing::info!(service_id, "Virtual service deactivated");
        }
        Ok(service)
    }

    /// Soft-delete an identity and deal its unaccepted tasks out to the
    /// remaining active identities.
    pub async fn delete_service(&self, service_id: DbId) -> EngineResult<ServiceDeletion> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let service = tx.find_service(service_id).await?.ok_or(CoreError::NotFound {
            entity: "virtual_service",
            id: service_id,
        })?;
        tx.soft_delete_service(service_id).await?;

        let tasks = tx.unaccepted_tasks_by_founder(service_id).await?;
        let loads = tx.service_loads().await?;
        let ranked = rank(&loads, now, &self.config.priority);

        let mut reassigned = 0;
        for (i, task) in tasks.iter().enumerate() {
            let Some(target) = round_robin(&ranked, i) else {
                break;
            };
            tx.set_task_founder(task.id, target.service_id, &target.service_name)
                .await?;
            reassigned += 1;
        }
        tx.commit().await?;

        let orphaned = tasks.len() - reassigned;
        if orphaned > 0 {
            tracing::warn!(
                service_id,
                orphaned,
                "No active identity left to take over unaccepted tasks"
            );
        }
        tracing::info!(service_id, reassigned, "Virtual service deleted");
        Ok(ServiceDeletion {
            service,
            reassigned_tasks: reassigned,
            orphaned_tasks: orphaned,
        })
    }
}
