//! Type/attribute bindings and their per-type settings.
//!
//! Each operation is one transaction: the type check, the attribute
//! resolution (which may create the attribute), default validation and the
//! binding write either all commit or none do.

use chrono::Utc;
use tracing::{info, instrument};

use stockroom_core::{AttributeId, ProductTypeId};
use stockroom_schema::{
    BindingId, BindingSettingsPatch, BindingSpec, TypeAttributeBinding, TypeAttributeView,
};

use crate::catalog;
use crate::error::{SchemaError, SchemaResult, StoreError};
use crate::store::{constraints, SchemaStore};
use crate::types::find_type_in;

const ALREADY_ASSOCIATED: &str = "This attribute is already associated with the type.";
const ASSOCIATION_NOT_FOUND: &str = "Association not found for type and attribute.";

#[derive(Debug, Clone)]
pub struct BindingCoordinator<S> {
    store: S,
}

impl<S> BindingCoordinator<S>
where
    S: SchemaStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Bind an existing or newly described attribute to a type.
    #[instrument(
        skip(self, spec),
        fields(type_id = %type_id, attribute_id = tracing::field::Empty),
        err
    )]
    pub async fn add(&self, type_id: ProductTypeId, spec: BindingSpec) -> SchemaResult<TypeAttributeView> {
        let resolution = spec.attribute.resolution()?;

        let mut tx = self.store.begin().await?;
        find_type_in(tx.as_mut(), type_id).await?;

        let attribute = catalog::resolve_in(tx.as_mut(), resolution).await?;
        tracing::Span::current().record("attribute_id", tracing::field::display(attribute.id));

        let id = BindingId::new(type_id, attribute.id);
        if tx.find_binding(id).await?.is_some() {
            return Err(SchemaError::bad_request(ALREADY_ASSOCIATED));
        }

        let binding = TypeAttributeBinding::new(
            type_id,
            &attribute,
            spec.is_required.unwrap_or(false),
            spec.default_value,
            Utc::now(),
        )?;

        tx.insert_binding(&binding).await.map_err(|e| {
            if e.violates(constraints::BINDING_PKEY) {
                SchemaError::bad_request(ALREADY_ASSOCIATED)
            } else {
                e.into()
            }
        })?;
        tx.commit().await?;

        info!(binding = %binding.id, "attribute bound to type");
        Ok(TypeAttributeView::join(&binding, &attribute))
    }

    /// All attributes bound to a type, ordered by attribute name then id.
    #[instrument(skip(self), fields(type_id = %type_id), err)]
    pub async fn list(&self, type_id: ProductTypeId) -> SchemaResult<Vec<TypeAttributeView>> {
        let mut tx = self.store.begin().await?;
        find_type_in(tx.as_mut(), type_id).await?;

        let bindings = tx.bindings_for_type(type_id).await?;
        let mut views = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            let attribute = tx.find_attribute(binding.attribute_id()).await?.ok_or_else(|| {
                StoreError::Backend(format!("binding {} references a missing attribute", binding.id))
            })?;
            views.push(TypeAttributeView::join(binding, &attribute));
        }
        tx.commit().await?;

        views.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(views)
    }

    /// Merge binding settings; absent fields keep their stored value.
    #[instrument(skip(self, patch), fields(type_id = %type_id, attribute_id = %attribute_id), err)]
    pub async fn update_settings(
        &self,
        type_id: ProductTypeId,
        attribute_id: AttributeId,
        patch: BindingSettingsPatch,
    ) -> SchemaResult<TypeAttributeView> {
        let mut tx = self.store.begin().await?;
        let mut binding = tx
            .find_binding(BindingId::new(type_id, attribute_id))
            .await?
            .ok_or_else(|| SchemaError::not_found(ASSOCIATION_NOT_FOUND))?;
        let attribute = catalog::find_in(tx.as_mut(), attribute_id).await?;

        if binding.apply_settings(patch, &attribute, Utc::now())? {
            tx.update_binding(&binding).await?;
            tx.commit().await?;
            info!(binding = %binding.id, "binding settings updated");
        }

        Ok(TypeAttributeView::join(&binding, &attribute))
    }

    /// Unbind an attribute from a type. The attribute itself is kept.
    #[instrument(skip(self), fields(type_id = %type_id, attribute_id = %attribute_id), err)]
    pub async fn remove(&self, type_id: ProductTypeId, attribute_id: AttributeId) -> SchemaResult<()> {
        let id = BindingId::new(type_id, attribute_id);
        let mut tx = self.store.begin().await?;
        if !tx.delete_binding(id).await? {
            return Err(SchemaError::not_found(ASSOCIATION_NOT_FOUND));
        }
        tx.commit().await?;

        info!(binding = %id, "attribute unbound from type");
        Ok(())
    }
}
