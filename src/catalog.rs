use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::auth::{require_role, Principal};
use crate::error::AppError;
use crate::models::{NewService, Role, Service, ServiceChanges, ServiceDetails, ServiceListing, VehicleSize};
use crate::store::Store;

#[derive(Debug, Clone, Deserialize)]
pub struct PriceInput {
    #[serde(alias = "vehicle_size")]
    pub size: String,
    pub price: Decimal,
}

/// Body of `PUT /api/services/:id`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUpdate {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub features_exterior: Vec<String>,
    #[serde(default)]
    pub features_interior: Vec<String>,
    #[serde(default)]
    pub prices: Vec<PriceInput>,
}

impl ServiceUpdate {
    fn validate(self) -> Result<ServiceChanges, AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::invalid("service name is required"));
        }
        let prices = self
            .prices
            .into_iter()
            .map(|p| {
                let size: VehicleSize = p.size.parse().map_err(AppError::InvalidInput)?;
                if p.price.is_sign_negative() {
                    return Err(AppError::invalid(format!("negative price for {}", size)));
                }
                Ok((size, p.price))
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(ServiceChanges {
            name: self.name.trim().to_string(),
            description: self.description,
            details: ServiceDetails {
                tag: self.tag.unwrap_or_default(),
                exterior: self.features_exterior,
                interior: self.features_interior,
            },
            prices,
        })
    }
}

pub struct Catalog {
    store: Arc<dyn Store>,
}

impl Catalog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Catalog { store }
    }

    pub async fn list(&self) -> Result<Vec<ServiceListing>, AppError> {
        Ok(self.store.list_active_services().await?)
    }

    pub async fn create(&self, principal: &Principal, new: NewService) -> Result<Service, AppError> {
        require_role(principal, Role::Admin)?;
        if new.name.trim().is_empty() {
            return Err(AppError::invalid("service name is required"));
        }
        let service = self.store.create_service(&new).await?;
        info!("Service {} '{}' created with zero prices", service.id, service.name);
        Ok(service)
    }

    pub async fn update(&self, principal: &Principal, id: i32, update: ServiceUpdate) -> Result<(), AppError> {
        require_role(principal, Role::Admin)?;
        let changes = update.validate()?;
        if !self.store.update_service(id, &changes).await? {
            return Err(AppError::not_found(format!("service {}", id)));
        }
        info!("Service {} updated ({} prices)", id, changes.prices.len());
        Ok(())
    }

    pub async fn archive(&self, principal: &Principal, id: i32) -> Result<(), AppError> {
        require_role(principal, Role::Admin)?;
        if !self.store.archive_service(id).await? {
            return Err(AppError::not_found(format!("service {}", id)));
        }
        info!("Service {} archived", id);
        Ok(())
    }
}
