//! End-to-end tests for the schema coordinators over the in-memory store.
//!
//! Verifies:
//! - Canonical attribute deduplication across binding requests
//! - Default value validation on add and on settings updates
//! - Type deletion cascades atomically and leaves attributes in place
//! - The catalog insert race resolves to the winner's row

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use stockroom_core::{AttributeId, ProductTypeId};
use stockroom_schema::{
    Attribute, AttributeDataType, AttributeDefinition, AttributeKey, AttributePatch, AttributeRequest,
    BindingId, BindingSettingsPatch, BindingSpec, NewProductType, ProductType, ProductTypePatch,
    TypeAttributeBinding,
};

use crate::catalog::insert_or_reselect;
use crate::error::{SchemaError, StoreError, StoreResult};
use crate::store::{InMemorySchemaStore, SchemaStore, SchemaTx};
use crate::{AttributeCatalog, BindingCoordinator, TypeLifecycle};

type Store = Arc<InMemorySchemaStore>;

struct Harness {
    store: Store,
    types: TypeLifecycle<Store>,
    catalog: AttributeCatalog<Store>,
    bindings: BindingCoordinator<Store>,
}

fn harness() -> Harness {
    stockroom_observability::init();
    let store = InMemorySchemaStore::arc();
    Harness {
        types: TypeLifecycle::new(store.clone()),
        catalog: AttributeCatalog::new(store.clone()),
        bindings: BindingCoordinator::new(store.clone()),
        store,
    }
}

impl Harness {
    async fn product_type(&self, name: &str) -> ProductTypeId {
        self.types.create(NewProductType::named(name)).await.unwrap().id
    }

    async fn binding(&self, type_id: ProductTypeId, attribute_id: AttributeId) -> Option<TypeAttributeBinding> {
        let mut tx = self.store.begin().await.unwrap();
        tx.find_binding(BindingId::new(type_id, attribute_id)).await.unwrap()
    }
}

fn select(name: &str, options: &str) -> AttributeRequest {
    AttributeRequest::named(name, AttributeDataType::Select, Some(options))
}

fn number(name: &str) -> AttributeRequest {
    AttributeRequest::named(name, AttributeDataType::Number, None)
}

fn assert_bad_request(result: Result<impl std::fmt::Debug, SchemaError>, fragment: &str) {
    match result {
        Err(SchemaError::BadRequest(msg)) => {
            assert!(msg.contains(fragment), "message {msg:?} should mention {fragment:?}")
        }
        other => panic!("Expected BadRequest, got {other:?}"),
    }
}

fn assert_not_found(result: Result<impl std::fmt::Debug, SchemaError>) {
    match result {
        Err(SchemaError::NotFound(_)) => {}
        other => panic!("Expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn option_spelling_does_not_split_canonical_attribute() {
    let h = harness();
    let paint = h.product_type("Paint").await;
    let fabric = h.product_type("Fabric").await;

    let first = h
        .bindings
        .add(paint, BindingSpec::new(select("Color", "red, blue,Blue")))
        .await
        .unwrap();
    assert_eq!(first.options.as_deref(), Some("Blue,blue,red"));

    let second = h
        .bindings
        .add(fabric, BindingSpec::new(select("Color", "blue,Blue,red")))
        .await
        .unwrap();
    assert_eq!(second.id, first.id);

    let resolved = h.catalog.resolve(&select("Color", " red ,Blue,blue,")).await.unwrap();
    assert_eq!(resolved.id, first.id);
}

#[tokio::test]
async fn description_is_not_part_of_identity() {
    let h = harness();
    let created = h
        .catalog
        .resolve(&AttributeRequest {
            description: Some("Net weight".into()),
            ..number("Weight")
        })
        .await
        .unwrap();

    let reused = h
        .catalog
        .resolve(&AttributeRequest {
            description: Some("Gross weight".into()),
            ..number("Weight")
        })
        .await
        .unwrap();

    assert_eq!(reused.id, created.id);
    assert_eq!(reused.description.as_deref(), Some("Net weight"));
}

#[tokio::test]
async fn non_select_options_are_ignored_for_identity() {
    let h = harness();
    let plain = h.catalog.resolve(&number("Weight")).await.unwrap();
    let with_options = h
        .catalog
        .resolve(&AttributeRequest::named("Weight", AttributeDataType::Number, Some("kg,lb")))
        .await
        .unwrap();
    assert_eq!(with_options.id, plain.id);
    assert_eq!(with_options.options, None);
}

#[tokio::test]
async fn resolve_by_unknown_id_is_not_found() {
    let h = harness();
    assert_not_found(h.catalog.resolve(&AttributeRequest::existing(AttributeId::new())).await);
}

#[tokio::test]
async fn resolve_requires_name_and_data_type() {
    let h = harness();
    let request = AttributeRequest {
        name: Some("Color".into()),
        ..AttributeRequest::default()
    };
    assert_bad_request(h.catalog.resolve(&request).await, "required");
    assert_bad_request(
        h.catalog.resolve(&AttributeRequest::named("Color", AttributeDataType::Select, Some(" , "))).await,
        "SELECT",
    );
}

#[tokio::test]
async fn adding_same_attribute_twice_is_rejected() {
    let h = harness();
    let paint = h.product_type("Paint").await;

    let view = h.bindings.add(paint, BindingSpec::new(number("Weight"))).await.unwrap();

    assert_bad_request(
        h.bindings
            .add(paint, BindingSpec::new(AttributeRequest::existing(view.id)))
            .await,
        "already associated",
    );
    assert_bad_request(
        h.bindings.add(paint, BindingSpec::new(number("Weight"))).await,
        "already associated",
    );
}

#[tokio::test]
async fn add_to_unknown_type_is_not_found() {
    let h = harness();
    assert_not_found(h.bindings.add(ProductTypeId::new(), BindingSpec::new(number("Weight"))).await);
}

#[tokio::test]
async fn invalid_default_rolls_back_implicit_attribute() {
    let h = harness();
    let paint = h.product_type("Paint").await;

    assert_bad_request(
        h.bindings
            .add(paint, BindingSpec::new(number("Weight")).with_default("abc"))
            .await,
        "NUMBER",
    );

    // The attribute resolved for the failed request was never committed.
    h.catalog.create(&number("Weight")).await.unwrap();
    assert!(h.bindings.list(paint).await.unwrap().is_empty());
}

#[tokio::test]
async fn select_default_must_be_an_option() {
    let h = harness();
    let paint = h.product_type("Paint").await;

    assert_bad_request(
        h.bindings
            .add(paint, BindingSpec::new(select("Color", "red,blue")).with_default("green"))
            .await,
        "SELECT",
    );

    let view = h
        .bindings
        .add(paint, BindingSpec::new(select("Color", "red,blue")).with_default("red").required(true))
        .await
        .unwrap();
    assert_eq!(view.default_value.as_deref(), Some("red"));
    assert!(view.is_required);
}

#[tokio::test]
async fn settings_update_merges_present_fields() {
    let h = harness();
    let paint = h.product_type("Paint").await;
    let view = h
        .bindings
        .add(paint, BindingSpec::new(number("Weight")).with_default("10"))
        .await
        .unwrap();
    assert!(!view.is_required);

    let updated = h
        .bindings
        .update_settings(
            paint,
            view.id,
            BindingSettingsPatch {
                is_required: Some(true),
                default_value: None,
            },
        )
        .await
        .unwrap();
    assert!(updated.is_required);
    assert_eq!(updated.default_value.as_deref(), Some("10"));

    let stored = h.binding(paint, view.id).await.unwrap();
    assert!(stored.is_required);
    assert_eq!(stored.default_value.as_deref(), Some("10"));
}

#[tokio::test]
async fn settings_update_revalidates_default() {
    let h = harness();
    let paint = h.product_type("Paint").await;
    let view = h.bindings.add(paint, BindingSpec::new(number("Weight"))).await.unwrap();

    assert_bad_request(
        h.bindings
            .update_settings(
                paint,
                view.id,
                BindingSettingsPatch {
                    is_required: Some(true),
                    default_value: Some("heavy".into()),
                },
            )
            .await,
        "NUMBER",
    );

    let stored = h.binding(paint, view.id).await.unwrap();
    assert!(!stored.is_required);
    assert_eq!(stored.default_value, None);
}

#[tokio::test]
async fn settings_update_of_missing_binding_is_not_found() {
    let h = harness();
    let paint = h.product_type("Paint").await;
    let weight = h.catalog.resolve(&number("Weight")).await.unwrap();
    assert_not_found(
        h.bindings
            .update_settings(paint, weight.id, BindingSettingsPatch::default())
            .await,
    );
}

#[tokio::test]
async fn list_is_ordered_by_attribute_name() {
    let h = harness();
    let paint = h.product_type("Paint").await;
    for name in ["Weight", "Color", "Finish"] {
        h.bindings
            .add(paint, BindingSpec::new(AttributeRequest::named(name, AttributeDataType::String, None)))
            .await
            .unwrap();
    }

    let names: Vec<_> = h
        .bindings
        .list(paint)
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.name)
        .collect();
    assert_eq!(names, ["Color", "Finish", "Weight"]);

    assert_not_found(h.bindings.list(ProductTypeId::new()).await);
}

#[tokio::test]
async fn remove_keeps_the_attribute() {
    let h = harness();
    let paint = h.product_type("Paint").await;
    let view = h.bindings.add(paint, BindingSpec::new(number("Weight"))).await.unwrap();

    h.bindings.remove(paint, view.id).await.unwrap();
    assert!(h.binding(paint, view.id).await.is_none());
    assert_eq!(h.catalog.find_by_id(view.id).await.unwrap().name, "Weight");

    assert_not_found(h.bindings.remove(paint, view.id).await);
}

#[tokio::test]
async fn deleting_type_cascades_to_its_bindings() {
    let h = harness();
    let paint = h.product_type("Paint").await;
    let fabric = h.product_type("Fabric").await;

    let color = h.bindings.add(paint, BindingSpec::new(select("Color", "red,blue"))).await.unwrap();
    let weight = h.bindings.add(paint, BindingSpec::new(number("Weight"))).await.unwrap();
    h.bindings
        .add(fabric, BindingSpec::new(AttributeRequest::existing(color.id)))
        .await
        .unwrap();

    h.types.delete(paint).await.unwrap();

    assert_not_found(h.types.find_by_id(paint).await);
    assert!(h.binding(paint, color.id).await.is_none());
    assert!(h.binding(paint, weight.id).await.is_none());
    assert!(h.binding(fabric, color.id).await.is_some());

    // Attributes survive the cascade.
    h.catalog.find_by_id(color.id).await.unwrap();
    h.catalog.find_by_id(weight.id).await.unwrap();

    assert_bad_request(h.catalog.delete(color.id).await, "still linked");
    h.catalog.delete(weight.id).await.unwrap();
    assert_not_found(h.catalog.find_by_id(weight.id).await);
}

#[tokio::test]
async fn deleting_unknown_records_is_not_found() {
    let h = harness();
    assert_not_found(h.types.delete(ProductTypeId::new()).await);
    assert_not_found(h.catalog.delete(AttributeId::new()).await);
}

#[tokio::test]
async fn type_names_are_unique() {
    let h = harness();
    h.product_type("Paint").await;
    let fabric = h.product_type("Fabric").await;

    assert_bad_request(h.types.create(NewProductType::named("Paint")).await, "unique");
    assert_bad_request(
        h.types
            .update(
                fabric,
                ProductTypePatch {
                    name: Some("Paint".into()),
                    description: None,
                },
            )
            .await,
        "unique",
    );

    let renamed = h
        .types
        .update(
            fabric,
            ProductTypePatch {
                name: Some("Textile".into()),
                description: Some("Rolls and bolts".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(h.types.find_by_id(fabric).await.unwrap(), renamed);
}

#[tokio::test]
async fn explicit_create_rejects_existing_identity() {
    let h = harness();
    h.catalog.create(&select("Color", "red,blue")).await.unwrap();
    assert_bad_request(h.catalog.create(&select("Color", "blue, red")).await, "already exists");
    assert_bad_request(
        h.catalog.create(&AttributeRequest::existing(AttributeId::new())).await,
        "attributeId",
    );
}

#[tokio::test]
async fn attribute_update_keeps_bound_defaults_valid() {
    let h = harness();
    let paint = h.product_type("Paint").await;
    let color = h
        .bindings
        .add(paint, BindingSpec::new(select("Color", "red,blue")).with_default("red"))
        .await
        .unwrap();

    assert_bad_request(
        h.catalog
            .update(
                color.id,
                AttributePatch {
                    options: Some("green,blue".into()),
                    ..AttributePatch::default()
                },
            )
            .await,
        "incompatible default",
    );
    assert_eq!(h.catalog.find_by_id(color.id).await.unwrap().options.as_deref(), Some("blue,red"));

    let updated = h
        .catalog
        .update(
            color.id,
            AttributePatch {
                options: Some("red , green".into()),
                ..AttributePatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.options.as_deref(), Some("green,red"));
}

#[tokio::test]
async fn attribute_update_rejects_identity_collision() {
    let h = harness();
    h.catalog.create(&number("Weight")).await.unwrap();
    let mass = h.catalog.create(&number("Mass")).await.unwrap();

    assert_bad_request(
        h.catalog
            .update(
                mass.id,
                AttributePatch {
                    name: Some("Weight".into()),
                    ..AttributePatch::default()
                },
            )
            .await,
        "already exists",
    );

    let described = h
        .catalog
        .update(
            mass.id,
            AttributePatch {
                description: Some("Kilograms".into()),
                ..AttributePatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(described.id, mass.id);
    assert_eq!(described.description.as_deref(), Some("Kilograms"));
}

fn color_attribute() -> Attribute {
    let definition = AttributeDefinition::new("Color", None, AttributeDataType::Select, Some("red,blue")).unwrap();
    Attribute::from_definition(definition, Utc::now())
}

#[tokio::test]
async fn lost_insert_race_returns_winner() {
    let store = InMemorySchemaStore::new();
    let mut tx = store.begin().await.unwrap();

    let winner = color_attribute();
    tx.insert_attribute(&winner).await.unwrap();

    let loser = color_attribute();
    assert_ne!(loser.id, winner.id);
    let resolved = insert_or_reselect(tx.as_mut(), loser).await.unwrap();
    assert_eq!(resolved, winner);
}

// Store wrapper that injects faults into otherwise normal transactions.

#[derive(Clone, Default)]
struct FaultyStore {
    inner: InMemorySchemaStore,
    hide_key_lookups: bool,
    fail_binding_delete_at: Option<usize>,
}

struct FaultyTx {
    inner: Box<dyn SchemaTx>,
    hide_key_lookups: bool,
    fail_binding_delete_at: Option<usize>,
    binding_deletes: usize,
}

#[async_trait]
impl SchemaStore for FaultyStore {
    async fn begin(&self) -> StoreResult<Box<dyn SchemaTx>> {
        Ok(Box::new(FaultyTx {
            inner: self.inner.begin().await?,
            hide_key_lookups: self.hide_key_lookups,
            fail_binding_delete_at: self.fail_binding_delete_at,
            binding_deletes: 0,
        }))
    }
}

#[async_trait]
impl SchemaTx for FaultyTx {
    async fn find_type(&mut self, id: ProductTypeId) -> StoreResult<Option<ProductType>> {
        self.inner.find_type(id).await
    }
    async fn insert_type(&mut self, product_type: &ProductType) -> StoreResult<()> {
        self.inner.insert_type(product_type).await
    }
    async fn update_type(&mut self, product_type: &ProductType) -> StoreResult<()> {
        self.inner.update_type(product_type).await
    }
    async fn delete_type(&mut self, id: ProductTypeId) -> StoreResult<bool> {
        self.inner.delete_type(id).await
    }
    async fn find_attribute(&mut self, id: AttributeId) -> StoreResult<Option<Attribute>> {
        self.inner.find_attribute(id).await
    }
    async fn find_attribute_by_key(&mut self, key: &AttributeKey) -> StoreResult<Option<Attribute>> {
        if self.hide_key_lookups {
            return Ok(None);
        }
        self.inner.find_attribute_by_key(key).await
    }
    async fn insert_attribute(&mut self, attribute: &Attribute) -> StoreResult<()> {
        self.inner.insert_attribute(attribute).await
    }
    async fn update_attribute(&mut self, attribute: &Attribute) -> StoreResult<()> {
        self.inner.update_attribute(attribute).await
    }
    async fn delete_attribute(&mut self, id: AttributeId) -> StoreResult<bool> {
        self.inner.delete_attribute(id).await
    }
    async fn find_binding(&mut self, id: BindingId) -> StoreResult<Option<TypeAttributeBinding>> {
        self.inner.find_binding(id).await
    }
    async fn insert_binding(&mut self, binding: &TypeAttributeBinding) -> StoreResult<()> {
        self.inner.insert_binding(binding).await
    }
    async fn update_binding(&mut self, binding: &TypeAttributeBinding) -> StoreResult<()> {
        self.inner.update_binding(binding).await
    }
    async fn delete_binding(&mut self, id: BindingId) -> StoreResult<bool> {
        let n = self.binding_deletes;
        self.binding_deletes += 1;
        if self.fail_binding_delete_at == Some(n) {
            return Err(StoreError::Backend("injected binding delete failure".into()));
        }
        self.inner.delete_binding(id).await
    }
    async fn bindings_for_type(&mut self, type_id: ProductTypeId) -> StoreResult<Vec<TypeAttributeBinding>> {
        self.inner.bindings_for_type(type_id).await
    }
    async fn bindings_for_attribute(&mut self, attribute_id: AttributeId) -> StoreResult<Vec<TypeAttributeBinding>> {
        self.inner.bindings_for_attribute(attribute_id).await
    }
    async fn commit(&mut self) -> StoreResult<()> {
        self.inner.commit().await
    }
}

#[tokio::test]
async fn unreadable_race_winner_is_a_conflict() {
    let faulty = FaultyStore {
        hide_key_lookups: true,
        ..FaultyStore::default()
    };
    let catalog = AttributeCatalog::new(faulty.clone());

    catalog.resolve(&select("Color", "red,blue")).await.unwrap();

    match catalog.resolve(&select("Color", "blue,red")).await {
        Err(err @ SchemaError::Conflict(_)) => assert_eq!(err.error_code(), "conflict"),
        other => panic!("Expected Conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_cascade_leaves_type_and_bindings_untouched() {
    let faulty = FaultyStore {
        fail_binding_delete_at: Some(1),
        ..FaultyStore::default()
    };
    let types = TypeLifecycle::new(faulty.clone());
    let bindings = BindingCoordinator::new(faulty.clone());

    let paint = types.create(NewProductType::named("Paint")).await.unwrap().id;
    bindings.add(paint, BindingSpec::new(select("Color", "red,blue"))).await.unwrap();
    bindings.add(paint, BindingSpec::new(number("Weight"))).await.unwrap();

    match types.delete(paint).await {
        Err(err @ SchemaError::Store(_)) => assert_eq!(err.error_code(), "internal"),
        other => panic!("Expected Store error, got {other:?}"),
    }

    types.find_by_id(paint).await.unwrap();
    assert_eq!(bindings.list(paint).await.unwrap().len(), 2);
}
