//! Removal of a type's bindings when the type itself is deleted.

use tracing::{debug, instrument};

use stockroom_core::ProductTypeId;
use stockroom_schema::TypeAttributeBinding;

use crate::error::{SchemaResult, StoreError};
use crate::store::SchemaTx;

/// Runs inside the deleting transaction; never commits on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct CascadeCoordinator;

impl CascadeCoordinator {
    /// Delete every binding of `type_id` and return what was removed.
    ///
    /// Attributes are left in place. If this fails the caller drops the
    /// transaction, which discards any bindings already deleted here.
    #[instrument(skip(tx), fields(type_id = %type_id, removed = tracing::field::Empty), err)]
    pub async fn on_type_deleting(
        tx: &mut dyn SchemaTx,
        type_id: ProductTypeId,
    ) -> SchemaResult<Vec<TypeAttributeBinding>> {
        let bindings = tx.bindings_for_type(type_id).await?;

        for binding in &bindings {
            if !tx.delete_binding(binding.id).await? {
                return Err(StoreError::Backend(format!(
                    "binding {} disappeared during cascade",
                    binding.id
                ))
                .into());
            }
            debug!(attribute_id = %binding.attribute_id(), "binding removed");
        }

        tracing::Span::current().record("removed", bindings.len());
        Ok(bindings)
    }
}
