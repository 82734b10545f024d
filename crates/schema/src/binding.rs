use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{AttributeId, DomainError, DomainResult, Entity, ProductTypeId};

use crate::attribute::{Attribute, AttributeRequest};
use crate::data_type::AttributeDataType;
use crate::validator::validate_default_value;

/// Composite identity of a binding: at most one per `(type, attribute)` pair.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingId {
    pub type_id: ProductTypeId,
    pub attribute_id: AttributeId,
}

impl BindingId {
    pub fn new(type_id: ProductTypeId, attribute_id: AttributeId) -> Self {
        Self {
            type_id,
            attribute_id,
        }
    }
}

impl core::fmt::Display for BindingId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.type_id, self.attribute_id)
    }
}

/// Association of one product type with one attribute, plus per-type settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeAttributeBinding {
    pub id: BindingId,
    pub is_required: bool,
    /// Never blank; a blank default is stored as `None`.
    pub default_value: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TypeAttributeBinding {
    /// Bind `attribute` to `type_id`, validating the default against it.
    pub fn new(
        type_id: ProductTypeId,
        attribute: &Attribute,
        is_required: bool,
        default_value: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let default_value = non_blank(default_value);
        validate_default_value(
            default_value.as_deref(),
            attribute.data_type,
            attribute.options.as_deref(),
        )?;

        Ok(Self {
            id: BindingId::new(type_id, attribute.id),
            is_required,
            default_value,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn type_id(&self) -> ProductTypeId {
        self.id.type_id
    }

    pub fn attribute_id(&self) -> AttributeId {
        self.id.attribute_id
    }

    /// Merge a settings patch. Returns whether any stored value changed.
    ///
    /// A present default value is re-validated against the attribute's current
    /// definition; nothing is modified when validation fails.
    pub fn apply_settings(
        &mut self,
        patch: BindingSettingsPatch,
        attribute: &Attribute,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        if attribute.id != self.id.attribute_id {
            return Err(DomainError::validation(format!(
                "attribute {} is not the one bound by {}",
                attribute.id, self.id
            )));
        }

        let mut changed = false;

        if let Some(value) = patch.default_value {
            let value = non_blank(Some(value));
            validate_default_value(value.as_deref(), attribute.data_type, attribute.options.as_deref())?;
            if value != self.default_value {
                self.default_value = value;
                changed = true;
            }
        }

        if let Some(required) = patch.is_required {
            if required != self.is_required {
                self.is_required = required;
                changed = true;
            }
        }

        if changed {
            self.updated_at = now;
        }
        Ok(changed)
    }

    /// Check the stored default against a (possibly redefined) attribute.
    pub fn check_default(&self, attribute: &Attribute) -> DomainResult<()> {
        validate_default_value(
            self.default_value.as_deref(),
            attribute.data_type,
            attribute.options.as_deref(),
        )
    }
}

impl Entity for TypeAttributeBinding {
    type Id = BindingId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// "Add attribute to type" request: which attribute, plus binding settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingSpec {
    #[serde(flatten)]
    pub attribute: AttributeRequest,
    pub is_required: Option<bool>,
    pub default_value: Option<String>,
}

impl BindingSpec {
    pub fn new(attribute: AttributeRequest) -> Self {
        Self {
            attribute,
            ..Self::default()
        }
    }

    pub fn required(mut self, is_required: bool) -> Self {
        self.is_required = Some(is_required);
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Partial update of binding settings; absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingSettingsPatch {
    pub is_required: Option<bool>,
    pub default_value: Option<String>,
}

impl BindingSettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.is_required.is_none() && self.default_value.is_none()
    }
}

/// Joined record returned to callers: attribute fields + binding settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeAttributeView {
    pub id: AttributeId,
    pub name: String,
    pub description: Option<String>,
    pub data_type: AttributeDataType,
    pub options: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_required: bool,
    pub default_value: Option<String>,
}

impl TypeAttributeView {
    pub fn join(binding: &TypeAttributeBinding, attribute: &Attribute) -> Self {
        Self {
            id: attribute.id,
            name: attribute.name.clone(),
            description: attribute.description.clone(),
            data_type: attribute.data_type,
            options: attribute.options.clone(),
            created_at: attribute.created_at,
            updated_at: attribute.updated_at,
            is_required: binding.is_required,
            default_value: binding.default_value.clone(),
        }
    }
}
