use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{AttributeId, DomainError, DomainResult, Entity};

use crate::data_type::AttributeDataType;
use crate::options::normalize_options;

pub const ATTRIBUTE_NAME_MIN_CHARS: usize = 2;
pub const ATTRIBUTE_NAME_MAX_CHARS: usize = 255;
pub const ATTRIBUTE_DESCRIPTION_MAX_CHARS: usize = 1000;

/// A reusable field definition that types can bind to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub id: AttributeId,
    pub name: String,
    pub description: Option<String>,
    pub data_type: AttributeDataType,
    /// Canonical options; always `None` unless `data_type` is SELECT.
    pub options: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attribute {
    /// Materialize a validated definition as a fresh record.
    pub fn from_definition(definition: AttributeDefinition, now: DateTime<Utc>) -> Self {
        Self {
            id: AttributeId::new(),
            name: definition.name,
            description: definition.description,
            data_type: definition.data_type,
            options: definition.options,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> AttributeKey {
        AttributeKey {
            name: self.name.clone(),
            data_type: self.data_type,
            options: self.options.clone(),
        }
    }

    /// Merge a patch over this attribute and re-run the definition rules.
    ///
    /// Options supplied in the patch are taken raw and normalized again; when the
    /// patch leaves them out the stored (already canonical) options are kept.
    pub fn patched(&self, patch: AttributePatch) -> DomainResult<AttributeDefinition> {
        let raw_options = patch.options.or_else(|| self.options.clone());
        AttributeDefinition::new(
            patch.name.unwrap_or_else(|| self.name.clone()),
            patch.description.or_else(|| self.description.clone()),
            patch.data_type.unwrap_or(self.data_type),
            raw_options.as_deref(),
        )
    }

    /// Overwrite the definition fields, keeping identity and creation time.
    pub fn redefine(&mut self, definition: AttributeDefinition, now: DateTime<Utc>) {
        self.name = definition.name;
        self.description = definition.description;
        self.data_type = definition.data_type;
        self.options = definition.options;
        self.updated_at = now;
    }
}

impl Entity for Attribute {
    type Id = AttributeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Canonical identity of an attribute: `(name, data_type, normalized options)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeKey {
    pub name: String,
    pub data_type: AttributeDataType,
    pub options: Option<String>,
}

impl core::fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.options {
            Some(options) => write!(f, "{} ({}: {})", self.name, self.data_type, options),
            None => write!(f, "{} ({})", self.name, self.data_type),
        }
    }
}

/// A validated, normalized attribute definition that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDefinition {
    name: String,
    description: Option<String>,
    data_type: AttributeDataType,
    options: Option<String>,
}

impl AttributeDefinition {
    /// Validate the shape of a definition and normalize its options.
    ///
    /// SELECT requires at least one non-blank option; every other data type
    /// drops whatever options were supplied.
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        data_type: AttributeDataType,
        raw_options: Option<&str>,
    ) -> DomainResult<Self> {
        let name = name.into();
        let name_chars = name.trim().chars().count();
        if name_chars == 0 {
            return Err(DomainError::validation("attribute name cannot be empty"));
        }
        if !(ATTRIBUTE_NAME_MIN_CHARS..=ATTRIBUTE_NAME_MAX_CHARS).contains(&name_chars) {
            return Err(DomainError::validation(format!(
                "attribute name must be between {ATTRIBUTE_NAME_MIN_CHARS} and {ATTRIBUTE_NAME_MAX_CHARS} characters"
            )));
        }
        if description
            .as_ref()
            .is_some_and(|d| d.chars().count() > ATTRIBUTE_DESCRIPTION_MAX_CHARS)
        {
            return Err(DomainError::validation(format!(
                "attribute description cannot exceed {ATTRIBUTE_DESCRIPTION_MAX_CHARS} characters"
            )));
        }

        let options = if data_type.takes_options() {
            let normalized = raw_options.map(normalize_options).unwrap_or_default();
            if normalized.is_empty() {
                return Err(DomainError::validation("options are required for SELECT data type"));
            }
            Some(normalized)
        } else {
            None
        };

        Ok(Self {
            name,
            description,
            data_type,
            options,
        })
    }

    pub fn key(&self) -> AttributeKey {
        AttributeKey {
            name: self.name.clone(),
            data_type: self.data_type,
            options: self.options.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> AttributeDataType {
        self.data_type
    }

    pub fn options(&self) -> Option<&str> {
        self.options.as_deref()
    }
}

/// "Use existing or create new" request.
///
/// Either names an existing attribute by id, or describes one by
/// `(name, data_type, options)`; `description` is only used when a new row is
/// created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeRequest {
    pub attribute_id: Option<AttributeId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub data_type: Option<AttributeDataType>,
    pub options: Option<String>,
}

/// How an [`AttributeRequest`] is to be satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeResolution {
    /// Look the attribute up by id.
    Existing(AttributeId),
    /// Reuse the row with this canonical identity, or create it.
    Canonical(AttributeDefinition),
}

impl AttributeRequest {
    pub fn existing(attribute_id: AttributeId) -> Self {
        Self {
            attribute_id: Some(attribute_id),
            ..Self::default()
        }
    }

    pub fn named(
        name: impl Into<String>,
        data_type: AttributeDataType,
        options: Option<&str>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            data_type: Some(data_type),
            options: options.map(str::to_string),
            ..Self::default()
        }
    }

    /// Decide how to resolve this request, validating it before any lookup.
    pub fn resolution(&self) -> DomainResult<AttributeResolution> {
        if let Some(id) = self.attribute_id {
            return Ok(AttributeResolution::Existing(id));
        }
        let (Some(name), Some(data_type)) = (self.name.as_ref(), self.data_type) else {
            return Err(DomainError::validation(
                "name and dataType are required for new attributes",
            ));
        };
        AttributeDefinition::new(
            name.clone(),
            self.description.clone(),
            data_type,
            self.options.as_deref(),
        )
        .map(AttributeResolution::Canonical)
    }
}

/// Partial update of an attribute definition; absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub data_type: Option<AttributeDataType>,
    pub options: Option<String>,
}
