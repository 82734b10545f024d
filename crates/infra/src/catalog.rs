//! Attribute catalog: canonical attribute definitions and their deduplication.
//!
//! ## Canonical identity
//!
//! Two requests describe the same attribute when their
//! `(name, data_type, normalized options)` triples are equal. The catalog
//! looks the triple up first and only inserts when nothing matches; the
//! description never takes part in identity.
//!
//! ## Insert race
//!
//! Lookup-then-insert is not atomic. When two writers both miss the lookup,
//! the loser's insert hits [`constraints::ATTRIBUTE_CANONICAL_KEY`]. The loser
//! then re-selects the winner's row once, inside the same transaction. A
//! re-select that still finds nothing is reported as
//! [`SchemaError::Conflict`].

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use stockroom_core::AttributeId;
use stockroom_schema::{Attribute, AttributeKey, AttributePatch, AttributeRequest, AttributeResolution};

use crate::error::{SchemaError, SchemaResult};
use crate::store::{constraints, SchemaStore, SchemaTx};

const STILL_LINKED: &str = "Cannot delete attribute: it is still linked to one or more types.";

/// Owner of the `attributes` table.
#[derive(Debug, Clone)]
pub struct AttributeCatalog<S> {
    store: S,
}

impl<S> AttributeCatalog<S>
where
    S: SchemaStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Return the attribute a request refers to, creating it when it names a
    /// canonical identity that does not exist yet.
    #[instrument(skip(self, request), fields(attribute_id = ?request.attribute_id), err)]
    pub async fn resolve(&self, request: &AttributeRequest) -> SchemaResult<Attribute> {
        let resolution = request.resolution()?;
        let mut tx = self.store.begin().await?;
        let attribute = resolve_in(tx.as_mut(), resolution).await?;
        tx.commit().await?;
        Ok(attribute)
    }

    /// Explicitly create an attribute. An existing canonical identity is an error here.
    #[instrument(skip(self, request), fields(name = ?request.name), err)]
    pub async fn create(&self, request: &AttributeRequest) -> SchemaResult<Attribute> {
        let definition = match request.resolution()? {
            AttributeResolution::Canonical(definition) => definition,
            AttributeResolution::Existing(id) => {
                return Err(SchemaError::bad_request(format!(
                    "attributeId {id} cannot be supplied when creating an attribute"
                )));
            }
        };

        let key = definition.key();
        let mut tx = self.store.begin().await?;
        if tx.find_attribute_by_key(&key).await?.is_some() {
            return Err(already_exists(&key));
        }

        let attribute = Attribute::from_definition(definition, Utc::now());
        tx.insert_attribute(&attribute).await.map_err(|e| {
            if e.violates(constraints::ATTRIBUTE_CANONICAL_KEY) {
                already_exists(&key)
            } else {
                e.into()
            }
        })?;
        tx.commit().await?;

        info!(attribute_id = %attribute.id, key = %key, "attribute created");
        Ok(attribute)
    }

    #[instrument(skip(self), fields(attribute_id = %id), err)]
    pub async fn find_by_id(&self, id: AttributeId) -> SchemaResult<Attribute> {
        let mut tx = self.store.begin().await?;
        find_in(tx.as_mut(), id).await
    }

    /// Merge-update a definition.
    ///
    /// The merged definition must not collide with another attribute's
    /// canonical identity, and every default value already bound to this
    /// attribute must stay valid under it.
    #[instrument(skip(self, patch), fields(attribute_id = %id), err)]
    pub async fn update(&self, id: AttributeId, patch: AttributePatch) -> SchemaResult<Attribute> {
        let mut tx = self.store.begin().await?;
        let mut attribute = find_in(tx.as_mut(), id).await?;

        let definition = attribute.patched(patch)?;
        let key = definition.key();
        if let Some(other) = tx.find_attribute_by_key(&key).await? {
            if other.id != id {
                return Err(already_exists(&key));
            }
        }

        attribute.redefine(definition, Utc::now());

        for binding in tx.bindings_for_attribute(id).await? {
            binding.check_default(&attribute).map_err(|e| {
                SchemaError::bad_request(format!(
                    "attribute {} is bound to type {} with an incompatible default value: {}",
                    id,
                    binding.type_id(),
                    e
                ))
            })?;
        }

        tx.update_attribute(&attribute).await.map_err(|e| {
            if e.violates(constraints::ATTRIBUTE_CANONICAL_KEY) {
                already_exists(&key)
            } else {
                e.into()
            }
        })?;
        tx.commit().await?;

        info!(attribute_id = %id, key = %key, "attribute updated");
        Ok(attribute)
    }

    /// Delete an attribute that no type binds any more.
    #[instrument(skip(self), fields(attribute_id = %id), err)]
    pub async fn delete(&self, id: AttributeId) -> SchemaResult<()> {
        let mut tx = self.store.begin().await?;
        find_in(tx.as_mut(), id).await?;

        if !tx.bindings_for_attribute(id).await?.is_empty() {
            return Err(SchemaError::bad_request(STILL_LINKED));
        }

        // A binding added after the check above still trips the foreign key.
        tx.delete_attribute(id).await.map_err(|e| {
            if e.violates(constraints::BINDING_ATTRIBUTE_FK) {
                SchemaError::bad_request(STILL_LINKED)
            } else {
                e.into()
            }
        })?;
        tx.commit().await?;

        info!(attribute_id = %id, "attribute deleted");
        Ok(())
    }
}

fn already_exists(key: &AttributeKey) -> SchemaError {
    SchemaError::bad_request(format!("Attribute {key} already exists."))
}

pub(crate) async fn find_in(tx: &mut dyn SchemaTx, id: AttributeId) -> SchemaResult<Attribute> {
    tx.find_attribute(id)
        .await?
        .ok_or_else(|| SchemaError::not_found(format!("Attribute not found with id: {id}")))
}

/// Resolve inside an open transaction; used by the binding coordinator.
pub(crate) async fn resolve_in(
    tx: &mut dyn SchemaTx,
    resolution: AttributeResolution,
) -> SchemaResult<Attribute> {
    match resolution {
        AttributeResolution::Existing(id) => find_in(tx, id).await,
        AttributeResolution::Canonical(definition) => {
            let key = definition.key();
            if let Some(existing) = tx.find_attribute_by_key(&key).await? {
                debug!(attribute_id = %existing.id, key = %key, "reusing canonical attribute");
                return Ok(existing);
            }
            insert_or_reselect(tx, Attribute::from_definition(definition, Utc::now())).await
        }
    }
}

/// Insert `candidate`; if another writer got the canonical key first, return theirs.
pub(crate) async fn insert_or_reselect(
    tx: &mut dyn SchemaTx,
    candidate: Attribute,
) -> SchemaResult<Attribute> {
    match tx.insert_attribute(&candidate).await {
        Ok(()) => {
            info!(attribute_id = %candidate.id, key = %candidate.key(), "attribute created");
            Ok(candidate)
        }
        Err(err) if err.violates(constraints::ATTRIBUTE_CANONICAL_KEY) => {
            let key = candidate.key();
            warn!(key = %key, "canonical attribute created concurrently, re-selecting");
            tx.find_attribute_by_key(&key).await?.ok_or_else(|| {
                SchemaError::conflict(format!(
                    "attribute {key} was created concurrently but could not be re-read"
                ))
            })
        }
        Err(err) => Err(err.into()),
    }
}
