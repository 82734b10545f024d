//! Attribute schema domain module.
//!
//! Business rules for the dynamic attribute schema: data types, canonical
//! attribute identity, default value validation and type/attribute bindings.
//! Pure, deterministic logic (no IO, no storage).

pub mod attribute;
pub mod binding;
pub mod data_type;
pub mod options;
pub mod product_type;
pub mod validator;

pub use attribute::{
    Attribute, AttributeDefinition, AttributeKey, AttributePatch, AttributeRequest,
    AttributeResolution,
};
pub use binding::{
    BindingId, BindingSettingsPatch, BindingSpec, TypeAttributeBinding, TypeAttributeView,
};
pub use data_type::AttributeDataType;
pub use options::normalize_options;
pub use product_type::{NewProductType, ProductType, ProductTypePatch};
pub use validator::validate_default_value;
