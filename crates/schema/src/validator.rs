//! Default value validation against an attribute's declared data type.

use chrono::NaiveDate;

use stockroom_core::{DomainError, DomainResult};

use crate::data_type::AttributeDataType;
use crate::options::option_entries;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Check a candidate default value for an attribute.
///
/// An absent or blank value always passes (no default set). `options` is the
/// attribute's stored options string and is only consulted for SELECT.
pub fn validate_default_value(
    value: Option<&str>,
    data_type: AttributeDataType,
    options: Option<&str>,
) -> DomainResult<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if value.trim().is_empty() {
        return Ok(());
    }

    match data_type {
        AttributeDataType::Number => match value.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(()),
            _ => Err(invalid(value, data_type, "expected a decimal number")),
        },
        // Lenient: anything other than "true" (ignoring case) reads as false.
        AttributeDataType::Boolean => Ok(()),
        AttributeDataType::Date => match NaiveDate::parse_from_str(value, DATE_FORMAT) {
            // chrono accepts unpadded fields and short years; only the canonical spelling passes.
            Ok(date) if date.format(DATE_FORMAT).to_string() == value => Ok(()),
            _ => Err(invalid(value, data_type, "expected a date formatted YYYY-MM-DD")),
        },
        AttributeDataType::Select => match options {
            Some(options) if !option_entries(options).any(|o| o == value) => Err(invalid(
                value,
                data_type,
                "must be one of the defined options",
            )),
            _ => Ok(()),
        },
        AttributeDataType::String | AttributeDataType::Json => Ok(()),
    }
}

fn invalid(value: &str, data_type: AttributeDataType, reason: &str) -> DomainError {
    DomainError::validation(format!(
        "default value '{value}' is not valid for data type {data_type}: {reason}"
    ))
}
