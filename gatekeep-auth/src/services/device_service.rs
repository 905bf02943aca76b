use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use gatekeep_shared::errors::{AppError, AppResult, ErrorCode};
use gatekeep_shared::types::auth::{AuthUser, UserRole};

use crate::models::{Device, DeviceChanges};
use crate::store::DeviceStore;

/// Get-or-create of a client install, keyed by its UUID.
#[derive(Clone)]
pub struct DeviceResolver {
    devices: Arc<dyn DeviceStore>,
}

impl DeviceResolver {
    pub fn new(devices: Arc<dyn DeviceStore>) -> Self {
        Self { devices }
    }

    /// Returns the existing device for `device_uuid`, or registers a new one
    /// for `user_id`. Lookup failures other than "not found" propagate.
    pub async fn resolve(&self, device_uuid: Option<&str>, user_id: Uuid) -> AppResult<Device> {
        let device_uuid = device_uuid.map(str::trim).filter(|u| !u.is_empty());

        if let Some(uuid) = device_uuid {
            if let Some(device) = self.devices.get_by_uuid(uuid).await? {
                return Ok(device);
            }
        }

        let now = Utc::now();
        let device = Device {
            id: Uuid::now_v7(),
            device_uuid: device_uuid
                .map(str::to_owned)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            user_id,
            push_token: None,
            app_version_id: None,
            enabled: true,
            created_at: now,
            updated_at: now,
        };

        match self.devices.create(&device).await {
            Ok(()) => {
                tracing::debug!(device_id = %device.id, user_id = %user_id, "device registered");
                Ok(device)
            }
            // lost a create race for the same UUID: the winner's row is the device
            Err(e) if e.code() == Some(ErrorCode::Conflict) => {
                match self.devices.get_by_uuid(&device.device_uuid).await? {
                    Some(existing) => Ok(existing),
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }
}

/// Owner-facing management of registered devices. Soft-deleted devices are
/// invisible here but keep their rows.
#[derive(Clone)]
pub struct DeviceService {
    devices: Arc<dyn DeviceStore>,
}

impl DeviceService {
    pub fn new(devices: Arc<dyn DeviceStore>) -> Self {
        Self { devices }
    }

    pub async fn list(&self, user_id: Uuid) -> AppResult<Vec<Device>> {
        self.devices.list_by_user(user_id).await
    }

    /// The enabled device `id`, if `actor` owns it or is an admin.
    pub async fn get(&self, actor: &AuthUser, id: Uuid) -> AppResult<Device> {
        let device = self
            .devices
            .get(id)
            .await?
            .filter(|d| d.enabled)
            .ok_or_else(|| AppError::not_found("device not found"))?;

        if device.user_id != actor.user_id && actor.role != UserRole::Admin {
            return Err(AppError::forbidden("device belongs to another user"));
        }
        Ok(device)
    }

    pub async fn update(&self, actor: &AuthUser, id: Uuid, changes: &DeviceChanges) -> AppResult<Device> {
        let device = self.get(actor, id).await?;
        if changes.is_empty() {
            return Ok(device);
        }

        let updated = self
            .devices
            .update(id, changes)
            .await?
            .ok_or_else(|| AppError::not_found("device not found"))?;
        tracing::debug!(device_id = %id, "device updated");
        Ok(updated)
    }

    pub async fn disable(&self, actor: &AuthUser, id: Uuid) -> AppResult<()> {
        self.get(actor, id).await?;
        if !self.devices.disable(id).await? {
            return Err(AppError::not_found("device not found"));
        }
        tracing::info!(device_id = %id, user_id = %actor.user_id, "device disabled");
        Ok(())
    }
}
