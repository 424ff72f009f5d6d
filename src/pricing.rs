use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::AppError;
use crate::models::VehicleSize;
use crate::store::Store;

/// Resolves the authoritative price of a (service, vehicle size) pair.
#[derive(Clone)]
pub struct PricingResolver {
    store: Arc<dyn Store>,
}

impl PricingResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        PricingResolver { store }
    }

    /// Sizes outside the catalog enumeration, archived services and unpriced
    /// pairs all come back as `PriceNotFound`.
    pub async fn resolve(&self, service_id: i32, size: &str) -> Result<(VehicleSize, Decimal), AppError> {
        let not_found = || AppError::PriceNotFound {
            service_id,
            size: size.to_string(),
        };

        let vehicle_size: VehicleSize = size.parse().map_err(|_| not_found())?;
        let price = self
            .store
            .price_for(service_id, vehicle_size)
            .await?
            .ok_or_else(not_found)?;
        Ok((vehicle_size, price))
    }
}
