//! Transactional storage boundary for the attribute schema.
//!
//! Every coordinator operation runs inside one [`SchemaTx`]. Nothing becomes
//! visible to other transactions until [`SchemaTx::commit`]; dropping a
//! transaction without committing discards all of its writes.
//!
//! Backends enforce the same constraints (and report them under the same
//! names, see [`constraints`]) so that coordinators can reclassify violations
//! without knowing which backend they run on.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use stockroom_core::{AttributeId, ProductTypeId};
use stockroom_schema::{Attribute, AttributeKey, BindingId, ProductType, TypeAttributeBinding};

use crate::error::StoreResult;

pub use in_memory::InMemorySchemaStore;
pub use postgres::PostgresSchemaStore;

/// Names of the constraints the schema relies on.
pub mod constraints {
    /// Unique `(name, data_type, options)` on attributes.
    pub const ATTRIBUTE_CANONICAL_KEY: &str = "attributes_canonical_key";
    /// Unique type name.
    pub const PRODUCT_TYPE_NAME: &str = "product_types_name_key";
    /// Primary key `(type_id, attribute_id)` on bindings.
    pub const BINDING_PKEY: &str = "type_attributes_pkey";
    /// Binding -> type reference.
    pub const BINDING_TYPE_FK: &str = "type_attributes_type_id_fkey";
    /// Binding -> attribute reference.
    pub const BINDING_ATTRIBUTE_FK: &str = "type_attributes_attribute_id_fkey";
}

/// Opens transactions.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn SchemaTx>>;
}

#[async_trait]
impl<S> SchemaStore for Arc<S>
where
    S: SchemaStore + ?Sized,
{
    async fn begin(&self) -> StoreResult<Box<dyn SchemaTx>> {
        (**self).begin().await
    }
}

/// One unit of work against the schema tables.
///
/// Insert and delete methods report constraint violations as
/// [`crate::StoreError::UniqueViolation`] / [`crate::StoreError::ForeignKeyViolation`]
/// and leave the transaction usable afterwards.
#[async_trait]
pub trait SchemaTx: Send {
    // Product types.
    async fn find_type(&mut self, id: ProductTypeId) -> StoreResult<Option<ProductType>>;
    async fn insert_type(&mut self, product_type: &ProductType) -> StoreResult<()>;
    async fn update_type(&mut self, product_type: &ProductType) -> StoreResult<()>;
    /// Returns whether a row was removed.
    async fn delete_type(&mut self, id: ProductTypeId) -> StoreResult<bool>;

    // Attributes.
    async fn find_attribute(&mut self, id: AttributeId) -> StoreResult<Option<Attribute>>;
    async fn find_attribute_by_key(&mut self, key: &AttributeKey) -> StoreResult<Option<Attribute>>;
    async fn insert_attribute(&mut self, attribute: &Attribute) -> StoreResult<()>;
    async fn update_attribute(&mut self, attribute: &Attribute) -> StoreResult<()>;
    async fn delete_attribute(&mut self, id: AttributeId) -> StoreResult<bool>;

    // Bindings.
    async fn find_binding(&mut self, id: BindingId) -> StoreResult<Option<TypeAttributeBinding>>;
    async fn insert_binding(&mut self, binding: &TypeAttributeBinding) -> StoreResult<()>;
    async fn update_binding(&mut self, binding: &TypeAttributeBinding) -> StoreResult<()>;
    async fn delete_binding(&mut self, id: BindingId) -> StoreResult<bool>;
    async fn bindings_for_type(&mut self, type_id: ProductTypeId) -> StoreResult<Vec<TypeAttributeBinding>>;
    async fn bindings_for_attribute(&mut self, attribute_id: AttributeId) -> StoreResult<Vec<TypeAttributeBinding>>;

    /// Make all writes of this transaction durable and visible.
    async fn commit(&mut self) -> StoreResult<()>;
}
