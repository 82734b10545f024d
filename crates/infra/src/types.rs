//! Product type lifecycle.

use chrono::Utc;
use tracing::{info, instrument};

use stockroom_core::ProductTypeId;
use stockroom_schema::{NewProductType, ProductType, ProductTypePatch};

use crate::cascade::CascadeCoordinator;
use crate::error::{SchemaError, SchemaResult, StoreError};
use crate::store::{constraints, SchemaStore, SchemaTx};

const DUPLICATE_NAME: &str = "Type name has to be unique.";

/// Owner of the `product_types` table.
#[derive(Debug, Clone)]
pub struct TypeLifecycle<S> {
    store: S,
}

impl<S> TypeLifecycle<S>
where
    S: SchemaStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self, new), fields(name = %new.name), err)]
    pub async fn create(&self, new: NewProductType) -> SchemaResult<ProductType> {
        let product_type = ProductType::create(new, Utc::now())?;

        let mut tx = self.store.begin().await?;
        tx.insert_type(&product_type).await.map_err(classify_name)?;
        tx.commit().await?;

        info!(type_id = %product_type.id, "product type created");
        Ok(product_type)
    }

    #[instrument(skip(self), fields(type_id = %id), err)]
    pub async fn find_by_id(&self, id: ProductTypeId) -> SchemaResult<ProductType> {
        let mut tx = self.store.begin().await?;
        find_type_in(tx.as_mut(), id).await
    }

    #[instrument(skip(self, patch), fields(type_id = %id), err)]
    pub async fn update(&self, id: ProductTypeId, patch: ProductTypePatch) -> SchemaResult<ProductType> {
        let mut tx = self.store.begin().await?;
        let mut product_type = find_type_in(tx.as_mut(), id).await?;
        product_type.apply_patch(patch, Utc::now())?;

        tx.update_type(&product_type).await.map_err(classify_name)?;
        tx.commit().await?;
        Ok(product_type)
    }

    /// Delete a type together with all of its bindings, atomically.
    #[instrument(skip(self), fields(type_id = %id), err)]
    pub async fn delete(&self, id: ProductTypeId) -> SchemaResult<()> {
        let mut tx = self.store.begin().await?;
        find_type_in(tx.as_mut(), id).await?;

        let removed = CascadeCoordinator::on_type_deleting(tx.as_mut(), id).await?;

        tx.delete_type(id).await.map_err(|e| {
            if e.violates(constraints::BINDING_TYPE_FK) {
                SchemaError::conflict(format!("type {id} gained attribute bindings while being deleted"))
            } else {
                e.into()
            }
        })?;
        tx.commit().await?;

        info!(type_id = %id, bindings_removed = removed.len(), "product type deleted");
        Ok(())
    }
}

fn classify_name(err: StoreError) -> SchemaError {
    if err.violates(constraints::PRODUCT_TYPE_NAME) {
        SchemaError::bad_request(DUPLICATE_NAME)
    } else {
        err.into()
    }
}

pub(crate) async fn find_type_in(tx: &mut dyn SchemaTx, id: ProductTypeId) -> SchemaResult<ProductType> {
    tx.find_type(id)
        .await?
        .ok_or_else(|| SchemaError::not_found(format!("Type not found with id: {id}")))
}
