use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockroom_core::{AttributeId, Entity, ProductTypeId};
use stockroom_schema::{Attribute, AttributeKey, BindingId, ProductType, TypeAttributeBinding};

use super::constraints;
use super::{SchemaStore, SchemaTx};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
struct SchemaTables {
    types: HashMap<ProductTypeId, ProductType>,
    attributes: HashMap<AttributeId, Attribute>,
    bindings: HashMap<BindingId, TypeAttributeBinding>,
}

/// In-memory schema store.
///
/// Intended for tests/dev. Transactions are serialized: `begin` waits for the
/// previous transaction to finish, then works on a private copy of the tables
/// that replaces the shared state on commit.
#[derive(Debug, Clone, Default)]
pub struct InMemorySchemaStore {
    tables: Arc<Mutex<SchemaTables>>,
}

impl InMemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl SchemaStore for InMemorySchemaStore {
    async fn begin(&self) -> StoreResult<Box<dyn SchemaTx>> {
        let committed = self.tables.clone().lock_owned().await;
        let working = committed.clone();
        Ok(Box::new(InMemorySchemaTx {
            committed,
            working,
            open: true,
        }))
    }
}

/// Transaction over [`InMemorySchemaStore`]; holds the store lock until dropped.
pub struct InMemorySchemaTx {
    committed: OwnedMutexGuard<SchemaTables>,
    working: SchemaTables,
    open: bool,
}

impl InMemorySchemaTx {
    fn tables(&mut self) -> StoreResult<&mut SchemaTables> {
        if self.open {
            Ok(&mut self.working)
        } else {
            Err(StoreError::TransactionClosed)
        }
    }
}

fn put<E>(map: &mut HashMap<E::Id, E>, row: &E)
where
    E: Entity + Clone,
{
    map.insert(*row.id(), row.clone());
}

fn same_key(attribute: &Attribute, key: &AttributeKey) -> bool {
    attribute.name == key.name && attribute.data_type == key.data_type && attribute.options == key.options
}

#[async_trait]
impl SchemaTx for InMemorySchemaTx {
    async fn find_type(&mut self, id: ProductTypeId) -> StoreResult<Option<ProductType>> {
        Ok(self.tables()?.types.get(&id).cloned())
    }

    async fn insert_type(&mut self, product_type: &ProductType) -> StoreResult<()> {
        let tables = self.tables()?;
        if tables.types.contains_key(&product_type.id) {
            return Err(StoreError::unique("product_types_pkey"));
        }
        if tables.types.values().any(|t| t.name == product_type.name) {
            return Err(StoreError::unique(constraints::PRODUCT_TYPE_NAME));
        }
        put(&mut tables.types, product_type);
        Ok(())
    }

    async fn update_type(&mut self, product_type: &ProductType) -> StoreResult<()> {
        let tables = self.tables()?;
        if tables
            .types
            .values()
            .any(|t| t.id != product_type.id && t.name == product_type.name)
        {
            return Err(StoreError::unique(constraints::PRODUCT_TYPE_NAME));
        }
        if tables.types.contains_key(&product_type.id) {
            put(&mut tables.types, product_type);
        }
        Ok(())
    }

    async fn delete_type(&mut self, id: ProductTypeId) -> StoreResult<bool> {
        let tables = self.tables()?;
        if tables.bindings.keys().any(|b| b.type_id == id) {
            return Err(StoreError::foreign_key(constraints::BINDING_TYPE_FK));
        }
        Ok(tables.types.remove(&id).is_some())
    }

    async fn find_attribute(&mut self, id: AttributeId) -> StoreResult<Option<Attribute>> {
        Ok(self.tables()?.attributes.get(&id).cloned())
    }

    async fn find_attribute_by_key(&mut self, key: &AttributeKey) -> StoreResult<Option<Attribute>> {
        Ok(self
            .tables()?
            .attributes
            .values()
            .find(|a| same_key(a, key))
            .cloned())
    }

    async fn insert_attribute(&mut self, attribute: &Attribute) -> StoreResult<()> {
        let tables = self.tables()?;
        if tables.attributes.contains_key(&attribute.id) {
            return Err(StoreError::unique("attributes_pkey"));
        }
        let key = attribute.key();
        if tables.attributes.values().any(|a| same_key(a, &key)) {
            return Err(StoreError::unique(constraints::ATTRIBUTE_CANONICAL_KEY));
        }
        put(&mut tables.attributes, attribute);
        Ok(())
    }

    async fn update_attribute(&mut self, attribute: &Attribute) -> StoreResult<()> {
        let tables = self.tables()?;
        let key = attribute.key();
        if tables
            .attributes
            .values()
            .any(|a| a.id != attribute.id && same_key(a, &key))
        {
            return Err(StoreError::unique(constraints::ATTRIBUTE_CANONICAL_KEY));
        }
        if tables.attributes.contains_key(&attribute.id) {
            put(&mut tables.attributes, attribute);
        }
        Ok(())
    }

    async fn delete_attribute(&mut self, id: AttributeId) -> StoreResult<bool> {
        let tables = self.tables()?;
        if tables.bindings.keys().any(|b| b.attribute_id == id) {
            return Err(StoreError::foreign_key(constraints::BINDING_ATTRIBUTE_FK));
        }
        Ok(tables.attributes.remove(&id).is_some())
    }

    async fn find_binding(&mut self, id: BindingId) -> StoreResult<Option<TypeAttributeBinding>> {
        Ok(self.tables()?.bindings.get(&id).cloned())
    }

    async fn insert_binding(&mut self, binding: &TypeAttributeBinding) -> StoreResult<()> {
        let tables = self.tables()?;
        if tables.bindings.contains_key(&binding.id) {
            return Err(StoreError::unique(constraints::BINDING_PKEY));
        }
        if !tables.types.contains_key(&binding.id.type_id) {
            return Err(StoreError::foreign_key(constraints::BINDING_TYPE_FK));
        }
        if !tables.attributes.contains_key(&binding.id.attribute_id) {
            return Err(StoreError::foreign_key(constraints::BINDING_ATTRIBUTE_FK));
        }
        put(&mut tables.bindings, binding);
        Ok(())
    }

    async fn update_binding(&mut self, binding: &TypeAttributeBinding) -> StoreResult<()> {
        let tables = self.tables()?;
        if tables.bindings.contains_key(&binding.id) {
            put(&mut tables.bindings, binding);
        }
        Ok(())
    }

    async fn delete_binding(&mut self, id: BindingId) -> StoreResult<bool> {
        Ok(self.tables()?.bindings.remove(&id).is_some())
    }

    async fn bindings_for_type(&mut self, type_id: ProductTypeId) -> StoreResult<Vec<TypeAttributeBinding>> {
        let mut rows: Vec<_> = self
            .tables()?
            .bindings
            .values()
            .filter(|b| b.id.type_id == type_id)
            .cloned()
            .collect();
        rows.sort_by_key(|b| b.id.attribute_id);
        Ok(rows)
    }

    async fn bindings_for_attribute(&mut self, attribute_id: AttributeId) -> StoreResult<Vec<TypeAttributeBinding>> {
        let mut rows: Vec<_> = self
            .tables()?
            .bindings
            .values()
            .filter(|b| b.id.attribute_id == attribute_id)
            .cloned()
            .collect();
        rows.sort_by_key(|b| b.id.type_id);
        Ok(rows)
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let working = std::mem::take(self.tables()?);
        *self.committed = working;
        self.open = false;
        Ok(())
    }
}
