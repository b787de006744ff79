use crate::{
    entities::{product, weight_option, Product, WeightOption},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// A single stock reservation request: one cart line.
#[derive(Debug, Clone)]
pub struct StockReservation {
    pub product_id: Uuid,
    pub weight_option_id: Option<Uuid>,
    pub quantity: i32,
}

/// Service owning the per-product, per-weight-option stock counters.
///
/// `reserve` and `release` operate on the caller's connection so the whole
/// batch participates in the checkout transaction: either every line is
/// decremented or, on rollback, none are.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Reserves stock for every request, decrementing the matching counter.
    ///
    /// Resolution order: a supplied weight option decrements that option's
    /// quantity; otherwise the product's scalar quantity is decremented.
    /// The first shortfall fails the batch with `InsufficientStock`; the
    /// caller is expected to roll the transaction back.
    #[instrument(skip(self, conn, requests), fields(lines = requests.len()))]
    pub async fn reserve(
        &self,
        conn: &impl ConnectionTrait,
        requests: &[StockReservation],
    ) -> Result<(), ServiceError> {
        for request in requests {
            self.reserve_line(conn, request).await?;
        }
        Ok(())
    }

    async fn reserve_line(
        &self,
        conn: &impl ConnectionTrait,
        request: &StockReservation,
    ) -> Result<(), ServiceError> {
        let product = Product::find_by_id(request.product_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::ProductUnavailable(format!(
                    "Product {} not found",
                    request.product_id
                ))
            })?;
        if !product.is_active {
            return Err(ServiceError::ProductUnavailable(format!(
                "Product {} is no longer available",
                product.name
            )));
        }

        match request.weight_option_id {
            Some(option_id) => {
                let option = WeightOption::find_by_id(option_id)
                    .one(conn)
                    .await?
                    .filter(|o| o.product_id == request.product_id)
                    .ok_or_else(|| {
                        ServiceError::ProductUnavailable(format!(
                            "Weight option {} not found for product {}",
                            option_id, request.product_id
                        ))
                    })?;

                if request.quantity > option.quantity {
                    return Err(ServiceError::InsufficientStock {
                        product_id: product.id,
                        product_name: product.name,
                        weight_label: Some(option.weight_label),
                        requested: request.quantity,
                        available: option.quantity,
                    });
                }

                // Clamp at zero; the shortfall check above makes this a
                // no-op unless a concurrent writer slipped past isolation.
                let remaining = (option.quantity - request.quantity).max(0);
                let mut active: weight_option::ActiveModel = option.into();
                active.quantity = Set(remaining);
                active.updated_at = Set(Utc::now());
                active.update(conn).await?;
            }
            None => {
                if request.quantity > product.stock_quantity {
                    return Err(ServiceError::InsufficientStock {
                        product_id: product.id,
                        product_name: product.name,
                        weight_label: None,
                        requested: request.quantity,
                        available: product.stock_quantity,
                    });
                }

                let remaining = (product.stock_quantity - request.quantity).max(0);
                let mut active: product::ActiveModel = product.into();
                active.stock_quantity = Set(remaining);
                active.updated_at = Set(Utc::now());
                active.update(conn).await?;
            }
        }

        Ok(())
    }

    /// Returns previously reserved stock, used when an order is cancelled.
    /// Missing products are skipped: a delisted product cannot be restocked.
    #[instrument(skip(self, conn, requests), fields(lines = requests.len()))]
    pub async fn release(
        &self,
        conn: &impl ConnectionTrait,
        requests: &[StockReservation],
    ) -> Result<(), ServiceError> {
        for request in requests {
            match request.weight_option_id {
                Some(option_id) => {
                    if let Some(option) = WeightOption::find_by_id(option_id).one(conn).await? {
                        let restored = option.quantity + request.quantity;
                        let mut active: weight_option::ActiveModel = option.into();
                        active.quantity = Set(restored);
                        active.updated_at = Set(Utc::now());
                        active.update(conn).await?;
                    }
                }
                None => {
                    if let Some(product) =
                        Product::find_by_id(request.product_id).one(conn).await?
                    {
                        let restored = product.stock_quantity + request.quantity;
                        let mut active: product::ActiveModel = product.into();
                        active.stock_quantity = Set(restored);
                        active.updated_at = Set(Utc::now());
                        active.update(conn).await?;
                    }
                }
            }
        }

        info!("Released stock for {} lines", requests.len());
        Ok(())
    }

    /// Current available quantity for a product or one of its weight options.
    pub async fn available_quantity(
        &self,
        product_id: Uuid,
        weight_option_id: Option<Uuid>,
    ) -> Result<i32, ServiceError> {
        match weight_option_id {
            Some(option_id) => {
                let option = WeightOption::find_by_id(option_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Weight option {} not found", option_id))
                    })?;
                Ok(option.quantity)
            }
            None => {
                let product = Product::find_by_id(product_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Product {} not found", product_id))
                    })?;
                Ok(product.stock_quantity)
            }
        }
    }
}
