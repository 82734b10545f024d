use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, ProductTypeId};

pub const TYPE_DESCRIPTION_MAX_CHARS: usize = 500;

/// A product category that owns a set of attribute bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductType {
    pub id: ProductTypeId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductType {
    pub fn create(new: NewProductType, now: DateTime<Utc>) -> DomainResult<Self> {
        validate_fields(&new.name, new.description.as_deref())?;
        Ok(Self {
            id: ProductTypeId::new(),
            name: new.name,
            description: new.description,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a partial update; absent fields keep their stored value.
    pub fn apply_patch(&mut self, patch: ProductTypePatch, now: DateTime<Utc>) -> DomainResult<()> {
        let name = patch.name.unwrap_or_else(|| self.name.clone());
        let description = patch.description.or_else(|| self.description.clone());
        validate_fields(&name, description.as_deref())?;
        self.name = name;
        self.description = description;
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for ProductType {
    type Id = ProductTypeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn validate_fields(name: &str, description: Option<&str>) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("type name cannot be empty"));
    }
    if description.is_some_and(|d| d.chars().count() > TYPE_DESCRIPTION_MAX_CHARS) {
        return Err(DomainError::validation(format!(
            "type description cannot exceed {TYPE_DESCRIPTION_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProductType {
    pub name: String,
    pub description: Option<String>,
}

impl NewProductType {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductTypePatch {
    pub name: Option<String>,
    pub description: Option<String>,
}
