//! Postgres-backed schema store.
//!
//! Tables are created by `migrations/0001_attribute_schema.sql`
//! (see [`PostgresSchemaStore::migrate`]).
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |-----------------------|------------|----------|
//! | `23505` | `UniqueViolation { constraint }` | duplicate canonical attribute, type name or binding |
//! | `23503` | `ForeignKeyViolation { constraint }` | binding to a missing parent, deleting a bound type/attribute |
//! | any other | `Backend` | everything else (network, pool closed, decode failures) |
//!
//! ## Savepoints
//!
//! A failed statement aborts a Postgres transaction. Every write runs inside a
//! savepoint that is rolled back on failure, so a coordinator can catch a
//! constraint violation and keep using the same transaction (e.g. re-select
//! the canonical attribute another writer just committed).

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use stockroom_core::{AttributeId, ProductTypeId};
use stockroom_schema::{
    Attribute, AttributeDataType, AttributeKey, BindingId, ProductType, TypeAttributeBinding,
};

use super::{SchemaStore, SchemaTx};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

const MIGRATION: &str = include_str!("../../migrations/0001_attribute_schema.sql");

/// Postgres-backed schema store.
///
/// Uses the SQLx pool (thread-safe); each [`SchemaStore::begin`] checks out a
/// connection and opens a database transaction on it.
#[derive(Debug, Clone)]
pub struct PostgresSchemaStore {
    pool: Arc<PgPool>,
}

impl PostgresSchemaStore {
    /// Create a new store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a connection pool from configuration.
    pub async fn connect(config: &StoreConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self::new(pool))
    }

    /// Create the schema tables if they do not exist yet.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(MIGRATION)
            .execute(&*self.pool)
            .await
            .context("failed to apply attribute schema migration")?;
        tracing::info!("attribute schema migration applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SchemaStore for PostgresSchemaStore {
    async fn begin(&self) -> StoreResult<Box<dyn SchemaTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresSchemaTx { tx: Some(tx) }))
    }
}

/// One database transaction. Dropping it without commit rolls it back.
pub struct PostgresSchemaTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresSchemaTx {
    fn conn(&mut self) -> StoreResult<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or(StoreError::TransactionClosed)
    }
}

/// Run a write inside a savepoint; on failure roll back to it and map the error.
async fn execute_guarded(
    conn: &mut PgConnection,
    operation: &'static str,
    query: Query<'_, Postgres, PgArguments>,
) -> StoreResult<u64> {
    sqlx::query("SAVEPOINT schema_write")
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("savepoint", e))?;

    match query.execute(&mut *conn).await {
        Ok(done) => {
            sqlx::query("RELEASE SAVEPOINT schema_write")
                .execute(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("release_savepoint", e))?;
            Ok(done.rows_affected())
        }
        Err(err) => {
            sqlx::query("ROLLBACK TO SAVEPOINT schema_write")
                .execute(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("rollback_to_savepoint", e))?;
            Err(map_sqlx_error(operation, err))
        }
    }
}

#[async_trait]
impl SchemaTx for PostgresSchemaTx {
    async fn find_type(&mut self, id: ProductTypeId) -> StoreResult<Option<ProductType>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, created_at, updated_at
            FROM product_types
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("find_type", e))?;

        row.map(|r| decode::<ProductTypeRow>(&r).map(Into::into)).transpose()
    }

    async fn insert_type(&mut self, product_type: &ProductType) -> StoreResult<()> {
        let query = sqlx::query(
            r#"
            INSERT INTO product_types (id, name, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(product_type.id.as_uuid())
        .bind(&product_type.name)
        .bind(&product_type.description)
        .bind(product_type.created_at)
        .bind(product_type.updated_at);

        execute_guarded(self.conn()?, "insert_type", query).await.map(|_| ())
    }

    async fn update_type(&mut self, product_type: &ProductType) -> StoreResult<()> {
        let query = sqlx::query(
            r#"
            UPDATE product_types
            SET name = $2, description = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(product_type.id.as_uuid())
        .bind(&product_type.name)
        .bind(&product_type.description)
        .bind(product_type.updated_at);

        execute_guarded(self.conn()?, "update_type", query).await.map(|_| ())
    }

    async fn delete_type(&mut self, id: ProductTypeId) -> StoreResult<bool> {
        let query = sqlx::query("DELETE FROM product_types WHERE id = $1").bind(id.as_uuid());
        let removed = execute_guarded(self.conn()?, "delete_type", query).await?;
        Ok(removed > 0)
    }

    async fn find_attribute(&mut self, id: AttributeId) -> StoreResult<Option<Attribute>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, data_type, options, created_at, updated_at
            FROM attributes
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("find_attribute", e))?;

        row.map(|r| decode::<AttributeRow>(&r).and_then(Attribute::try_from))
            .transpose()
    }

    async fn find_attribute_by_key(&mut self, key: &AttributeKey) -> StoreResult<Option<Attribute>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, data_type, options, created_at, updated_at
            FROM attributes
            WHERE name = $1 AND data_type = $2 AND options = $3
            "#,
        )
        .bind(&key.name)
        .bind(key.data_type.as_str())
        .bind(key.options.as_deref().unwrap_or(""))
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("find_attribute_by_key", e))?;

        row.map(|r| decode::<AttributeRow>(&r).and_then(Attribute::try_from))
            .transpose()
    }

    async fn insert_attribute(&mut self, attribute: &Attribute) -> StoreResult<()> {
        let query = sqlx::query(
            r#"
            INSERT INTO attributes (id, name, description, data_type, options, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(attribute.id.as_uuid())
        .bind(&attribute.name)
        .bind(&attribute.description)
        .bind(attribute.data_type.as_str())
        .bind(attribute.options.as_deref().unwrap_or(""))
        .bind(attribute.created_at)
        .bind(attribute.updated_at);

        execute_guarded(self.conn()?, "insert_attribute", query).await.map(|_| ())
    }

    async fn update_attribute(&mut self, attribute: &Attribute) -> StoreResult<()> {
        let query = sqlx::query(
            r#"
            UPDATE attributes
            SET name = $2, description = $3, data_type = $4, options = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(attribute.id.as_uuid())
        .bind(&attribute.name)
        .bind(&attribute.description)
        .bind(attribute.data_type.as_str())
        .bind(attribute.options.as_deref().unwrap_or(""))
        .bind(attribute.updated_at);

        execute_guarded(self.conn()?, "update_attribute", query).await.map(|_| ())
    }

    async fn delete_attribute(&mut self, id: AttributeId) -> StoreResult<bool> {
        let query = sqlx::query("DELETE FROM attributes WHERE id = $1").bind(id.as_uuid());
        let removed = execute_guarded(self.conn()?, "delete_attribute", query).await?;
        Ok(removed > 0)
    }

    async fn find_binding(&mut self, id: BindingId) -> StoreResult<Option<TypeAttributeBinding>> {
        let row = sqlx::query(
            r#"
            SELECT type_id, attribute_id, is_required, default_value, created_at, updated_at
            FROM type_attributes
            WHERE type_id = $1 AND attribute_id = $2
            "#,
        )
        .bind(id.type_id.as_uuid())
        .bind(id.attribute_id.as_uuid())
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("find_binding", e))?;

        row.map(|r| decode::<BindingRow>(&r).map(Into::into)).transpose()
    }

    async fn insert_binding(&mut self, binding: &TypeAttributeBinding) -> StoreResult<()> {
        let query = sqlx::query(
            r#"
            INSERT INTO type_attributes (
                type_id,
                attribute_id,
                is_required,
                default_value,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(binding.id.type_id.as_uuid())
        .bind(binding.id.attribute_id.as_uuid())
        .bind(binding.is_required)
        .bind(&binding.default_value)
        .bind(binding.created_at)
        .bind(binding.updated_at);

        execute_guarded(self.conn()?, "insert_binding", query).await.map(|_| ())
    }

    async fn update_binding(&mut self, binding: &TypeAttributeBinding) -> StoreResult<()> {
        let query = sqlx::query(
            r#"
            UPDATE type_attributes
            SET is_required = $3, default_value = $4, updated_at = $5
            WHERE type_id = $1 AND attribute_id = $2
            "#,
        )
        .bind(binding.id.type_id.as_uuid())
        .bind(binding.id.attribute_id.as_uuid())
        .bind(binding.is_required)
        .bind(&binding.default_value)
        .bind(binding.updated_at);

        execute_guarded(self.conn()?, "update_binding", query).await.map(|_| ())
    }

    async fn delete_binding(&mut self, id: BindingId) -> StoreResult<bool> {
        let query = sqlx::query("DELETE FROM type_attributes WHERE type_id = $1 AND attribute_id = $2")
            .bind(id.type_id.as_uuid())
            .bind(id.attribute_id.as_uuid());
        let removed = execute_guarded(self.conn()?, "delete_binding", query).await?;
        Ok(removed > 0)
    }

    async fn bindings_for_type(&mut self, type_id: ProductTypeId) -> StoreResult<Vec<TypeAttributeBinding>> {
        let rows = sqlx::query(
            r#"
            SELECT type_id, attribute_id, is_required, default_value, created_at, updated_at
            FROM type_attributes
            WHERE type_id = $1
            ORDER BY attribute_id ASC
            "#,
        )
        .bind(type_id.as_uuid())
        .fetch_all(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("bindings_for_type", e))?;

        rows.iter()
            .map(|r| decode::<BindingRow>(r).map(Into::into))
            .collect()
    }

    async fn bindings_for_attribute(&mut self, attribute_id: AttributeId) -> StoreResult<Vec<TypeAttributeBinding>> {
        let rows = sqlx::query(
            r#"
            SELECT type_id, attribute_id, is_required, default_value, created_at, updated_at
            FROM type_attributes
            WHERE attribute_id = $1
            ORDER BY type_id ASC
            "#,
        )
        .bind(attribute_id.as_uuid())
        .fetch_all(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("bindings_for_attribute", e))?;

        rows.iter()
            .map(|r| decode::<BindingRow>(r).map(Into::into))
            .collect()
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self.tx.take().ok_or(StoreError::TransactionClosed)?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

/// Map SQLx errors to StoreError, keeping the name of a violated constraint.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation { constraint },
                Some("23503") => StoreError::ForeignKeyViolation { constraint },
                _ => StoreError::Backend(format!(
                    "database error in {}: {}",
                    operation,
                    db_err.message()
                )),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn decode<'r, T>(row: &'r PgRow) -> StoreResult<T>
where
    T: FromRow<'r, PgRow>,
{
    T::from_row(row).map_err(|e| StoreError::Backend(format!("failed to decode row: {}", e)))
}

// SQLx row types

#[derive(Debug)]
struct ProductTypeRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ProductTypeRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductTypeRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<ProductTypeRow> for ProductType {
    fn from(row: ProductTypeRow) -> Self {
        ProductType {
            id: ProductTypeId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug)]
struct AttributeRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    data_type: String,
    options: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AttributeRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AttributeRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            data_type: row.try_get("data_type")?,
            options: row.try_get("options")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<AttributeRow> for Attribute {
    type Error = StoreError;

    fn try_from(row: AttributeRow) -> Result<Self, Self::Error> {
        let data_type: AttributeDataType = row
            .data_type
            .parse()
            .map_err(|e| StoreError::Backend(format!("stored attribute {}: {}", row.id, e)))?;
        Ok(Attribute {
            id: AttributeId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            data_type,
            options: Some(row.options).filter(|o| !o.is_empty()),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct BindingRow {
    type_id: Uuid,
    attribute_id: Uuid,
    is_required: bool,
    default_value: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for BindingRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BindingRow {
            type_id: row.try_get("type_id")?,
            attribute_id: row.try_get("attribute_id")?,
            is_required: row.try_get("is_required")?,
            default_value: row.try_get("default_value")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<BindingRow> for TypeAttributeBinding {
    fn from(row: BindingRow) -> Self {
        TypeAttributeBinding {
            id: BindingId::new(
                ProductTypeId::from_uuid(row.type_id),
                AttributeId::from_uuid(row.attribute_id),
            ),
            is_required: row.is_required,
            default_value: row.default_value,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
