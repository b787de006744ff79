use crate::{
    entities::{customer_address, CustomerAddress, CustomerAddressModel},
    errors::ServiceError,
};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref PHONE_RE: Regex = Regex::new(r"^\d{10}$").unwrap();
    static ref PINCODE_RE: Regex = Regex::new(r"^\d{6}$").unwrap();
}

/// Shipping destination as snapshotted onto an order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ShippingAddress {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(regex = "PHONE_RE")]
    pub phone: String,
    #[validate(length(min = 1, max = 255))]
    pub address_line: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    pub state: Option<String>,
    #[validate(regex = "PINCODE_RE")]
    pub pincode: String,
}

impl From<CustomerAddressModel> for ShippingAddress {
    fn from(model: CustomerAddressModel) -> Self {
        Self {
            name: model.name,
            phone: model.phone,
            address_line: model.address_line,
            city: model.city,
            state: model.state,
            pincode: model.pincode,
        }
    }
}

/// Saved addresses plus the resolution chain checkout uses to pick one.
#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Picks the shipping address for a checkout, in priority order:
    /// explicit saved-address id, inline address, the default address,
    /// then the most recently created one. `NoAddressAvailable` when all
    /// four miss, unless the caller opted out of address capture.
    #[instrument(skip(self, conn, inline), fields(customer_id = %customer_id))]
    pub async fn resolve_shipping(
        &self,
        conn: &impl ConnectionTrait,
        customer_id: Uuid,
        inline: Option<ShippingAddress>,
        address_id: Option<Uuid>,
        skip_address: bool,
    ) -> Result<Option<ShippingAddress>, ServiceError> {
        if let Some(id) = address_id {
            let model = CustomerAddress::find_by_id(id)
                .one(conn)
                .await?
                .filter(|a| a.customer_id == customer_id)
                .ok_or_else(|| ServiceError::NotFound("Address not found".into()))?;
            return Ok(Some(model.into()));
        }

        if let Some(address) = inline {
            address
                .validate()
                .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
            return Ok(Some(address));
        }

        let default = CustomerAddress::find()
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .filter(customer_address::Column::IsDefault.eq(true))
            .one(conn)
            .await?;
        if let Some(model) = default {
            return Ok(Some(model.into()));
        }

        let latest = CustomerAddress::find()
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .order_by_desc(customer_address::Column::CreatedAt)
            .one(conn)
            .await?;
        if let Some(model) = latest {
            return Ok(Some(model.into()));
        }

        if skip_address {
            Ok(None)
        } else {
            Err(ServiceError::NoAddressAvailable)
        }
    }

    pub async fn list(&self, customer_id: Uuid) -> Result<Vec<CustomerAddressModel>, ServiceError> {
        Ok(CustomerAddress::find()
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .order_by_desc(customer_address::Column::IsDefault)
            .order_by_desc(customer_address::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Saves an address; the first one a customer saves becomes the default.
    #[instrument(skip(self, address), fields(customer_id = %customer_id))]
    pub async fn create(
        &self,
        customer_id: Uuid,
        address: ShippingAddress,
        make_default: bool,
    ) -> Result<CustomerAddressModel, ServiceError> {
        address
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let txn = self.db.begin().await?;

        let has_any = CustomerAddress::find()
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .one(&txn)
            .await?
            .is_some();
        let is_default = make_default || !has_any;

        if is_default {
            self.unset_default(&txn, customer_id).await?;
        }

        let model = customer_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            name: Set(address.name),
            phone: Set(address.phone),
            address_line: Set(address.address_line),
            city: Set(address.city),
            state: Set(address.state),
            pincode: Set(address.pincode),
            is_default: Set(is_default),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(model)
    }

    pub async fn set_default(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
    ) -> Result<CustomerAddressModel, ServiceError> {
        let txn = self.db.begin().await?;

        let model = CustomerAddress::find_by_id(address_id)
            .one(&txn)
            .await?
            .filter(|a| a.customer_id == customer_id)
            .ok_or_else(|| ServiceError::NotFound("Address not found".into()))?;

        self.unset_default(&txn, customer_id).await?;

        let mut active: customer_address::ActiveModel = model.into();
        active.is_default = Set(true);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        Ok(updated)
    }

    pub async fn delete(&self, customer_id: Uuid, address_id: Uuid) -> Result<(), ServiceError> {
        let model = CustomerAddress::find_by_id(address_id)
            .one(&*self.db)
            .await?
            .filter(|a| a.customer_id == customer_id)
            .ok_or_else(|| ServiceError::NotFound("Address not found".into()))?;
        model.delete(&*self.db).await?;
        Ok(())
    }

    async fn unset_default(
        &self,
        conn: &impl ConnectionTrait,
        customer_id: Uuid,
    ) -> Result<(), ServiceError> {
        let defaults = CustomerAddress::find()
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .filter(customer_address::Column::IsDefault.eq(true))
            .all(conn)
            .await?;
        for model in defaults {
            let mut active: customer_address::ActiveModel = model.into();
            active.is_default = Set(false);
            active.updated_at = Set(Utc::now());
            active.update(conn).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Asha Rao".to_string(),
            phone: "9876543210".to_string(),
            address_line: "12 MG Road".to_string(),
            city: "Bengaluru".to_string(),
            state: Some("Karnataka".to_string()),
            pincode: "560001".to_string(),
        }
    }

    #[test]
    fn valid_address_passes() {
        assert!(address().validate().is_ok());
    }

    #[test]
    fn phone_must_be_ten_digits() {
        let mut a = address();
        a.phone = "12345".to_string();
        assert!(a.validate().is_err());
        a.phone = "98765432101".to_string();
        assert!(a.validate().is_err());
    }

    #[test]
    fn pincode_must_be_six_digits() {
        let mut a = address();
        a.pincode = "56001".to_string();
        assert!(a.validate().is_err());
        a.pincode = "ABC123".to_string();
        assert!(a.validate().is_err());
    }
}
