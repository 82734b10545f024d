use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockroom_core::DomainError;

/// Closed set of data types an attribute may declare.
///
/// Values are always carried as strings and checked at the boundary by
/// [`crate::validate_default_value`]; there is no per-type value class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttributeDataType {
    String,
    Number,
    Boolean,
    Date,
    Select,
    Json,
}

impl AttributeDataType {
    pub const ALL: [AttributeDataType; 6] = [
        AttributeDataType::String,
        AttributeDataType::Number,
        AttributeDataType::Boolean,
        AttributeDataType::Date,
        AttributeDataType::Select,
        AttributeDataType::Json,
    ];

    /// Storage / wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeDataType::String => "STRING",
            AttributeDataType::Number => "NUMBER",
            AttributeDataType::Boolean => "BOOLEAN",
            AttributeDataType::Date => "DATE",
            AttributeDataType::Select => "SELECT",
            AttributeDataType::Json => "JSON",
        }
    }

    /// Only SELECT attributes carry an options list.
    pub fn takes_options(&self) -> bool {
        matches!(self, AttributeDataType::Select)
    }
}

impl core::fmt::Display for AttributeDataType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeDataType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown data type: {s}")))
    }
}
