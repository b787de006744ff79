use crate::{
    entities::{customer, Customer, CustomerModel},
    errors::ServiceError,
};
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use uuid::Uuid;

/// Customer identity lookups.
///
/// Clients may send either the internal UUID or the opaque identifier the
/// auth layer issued; both resolve to the same row.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Resolves a client-supplied identifier to a customer. Identifiers
    /// that parse as a UUID are tried as the primary key first, then as
    /// the external reference; anything else is external-reference only.
    pub async fn resolve(
        &self,
        conn: &impl ConnectionTrait,
        identifier: &str,
    ) -> Result<CustomerModel, ServiceError> {
        if let Ok(id) = Uuid::parse_str(identifier) {
            if let Some(found) = Customer::find_by_id(id).one(conn).await? {
                return Ok(found);
            }
        }

        Customer::find()
            .filter(customer::Column::ExternalRef.eq(identifier))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Customer not found".into()))
    }

    pub async fn get(&self, customer_id: Uuid) -> Result<CustomerModel, ServiceError> {
        Customer::find_by_id(customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Customer not found".into()))
    }
}
