use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use config::shared::ColumnWidthConfig;
use serde::{Deserialize, Serialize};

use crate::bail;
use crate::error::{ErrorKind, ExportResult};
use crate::schema::column::{ColumnDefinition, ColumnType};

/// Width of string columns whose field type has no dedicated default.
pub const DEFAULT_STRING_MAX_LENGTH: u32 = 100;

/// Default column widths per field type. Field types missing here use
/// [`DEFAULT_STRING_MAX_LENGTH`].
const DEFAULT_WIDTHS: &[(FieldType, u32)] = &[
    (FieldType::CalendarDate, 10),
    (FieldType::DurationV2, 24),
    (FieldType::InlineJsonBlob, 100),
    (FieldType::SingleChoice, 100),
    (FieldType::String, 100),
    (FieldType::TimeV2, 12),
];

/// Semantic type of a field in an exported record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Attachment,
    Boolean,
    CalendarDate,
    DurationV2,
    Float,
    InlineJsonBlob,
    Int,
    SingleChoice,
    String,
    TimeV2,
    Timestamp,
}

impl FieldType {
    const ALL: [FieldType; 11] = [
        FieldType::Attachment,
        FieldType::Boolean,
        FieldType::CalendarDate,
        FieldType::DurationV2,
        FieldType::Float,
        FieldType::InlineJsonBlob,
        FieldType::Int,
        FieldType::SingleChoice,
        FieldType::String,
        FieldType::TimeV2,
        FieldType::Timestamp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Attachment => "attachment",
            FieldType::Boolean => "boolean",
            FieldType::CalendarDate => "calendar_date",
            FieldType::DurationV2 => "duration_v2",
            FieldType::Float => "float",
            FieldType::InlineJsonBlob => "inline_json_blob",
            FieldType::Int => "int",
            FieldType::SingleChoice => "single_choice",
            FieldType::String => "string",
            FieldType::TimeV2 => "time_v2",
            FieldType::Timestamp => "timestamp",
        }
    }

    /// Returns the column type values of this field type are stored in.
    pub fn column_type(&self) -> ColumnType {
        match self {
            FieldType::Int => ColumnType::Integer,
            FieldType::Float => ColumnType::Double,
            FieldType::Boolean => ColumnType::Boolean,
            FieldType::Timestamp => ColumnType::Date,
            FieldType::Attachment => ColumnType::FileHandleId,
            FieldType::CalendarDate
            | FieldType::DurationV2
            | FieldType::InlineJsonBlob
            | FieldType::SingleChoice
            | FieldType::String
            | FieldType::TimeV2 => ColumnType::String,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .into_iter()
            .find(|field_type| field_type.as_str() == s)
            .ok_or_else(|| format!("unknown field type `{s}`"))
    }
}

/// Definition of a field in an exported record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    /// Explicit width of the backing string column, which wins over any type default.
    pub max_length: Option<u32>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            max_length: None,
        }
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

/// Maps field types to the max length of the string columns backing them.
#[derive(Debug, Clone)]
pub struct FieldTypeWidthPolicy {
    widths: HashMap<FieldType, u32>,
}

impl FieldTypeWidthPolicy {
    /// Builds a policy from the default width table and the configured overrides.
    ///
    /// Fails with [`ErrorKind::ConfigError`] when an override names an unknown field type.
    pub fn from_config(config: &ColumnWidthConfig) -> ExportResult<Self> {
        let mut policy = Self::default();

        for (name, width) in &config.overrides {
            let field_type = match name.parse::<FieldType>() {
                Ok(field_type) => field_type,
                Err(detail) => bail!(
                    ErrorKind::ConfigError,
                    "Invalid column width override",
                    detail
                ),
            };

            policy.widths.insert(field_type, *width);
        }

        Ok(policy)
    }

    /// Returns the max length of the string column for `field`.
    ///
    /// The field's explicit max length wins, then the width configured for its type, then
    /// [`DEFAULT_STRING_MAX_LENGTH`].
    pub fn max_length_for_field(&self, field: &FieldDefinition) -> u32 {
        field.max_length.unwrap_or_else(|| {
            self.widths
                .get(&field.field_type)
                .copied()
                .unwrap_or(DEFAULT_STRING_MAX_LENGTH)
        })
    }
}

impl Default for FieldTypeWidthPolicy {
    fn default() -> Self {
        Self {
            widths: DEFAULT_WIDTHS.iter().copied().collect(),
        }
    }
}

/// Builds the column definition that stores values of `field`.
///
/// Only string columns carry a max length.
pub fn column_definition_for_field(
    field: &FieldDefinition,
    policy: &FieldTypeWidthPolicy,
) -> ColumnDefinition {
    let column = ColumnDefinition::new(field.name.clone(), field.field_type.column_type());

    match column.column_type {
        ColumnType::String => {
            let max_length = policy.max_length_for_field(field);
            column.with_max_length(max_length)
        }
        _ => column,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn default_widths_per_field_type() {
        let policy = FieldTypeWidthPolicy::default();
        let cases = [
            (FieldType::CalendarDate, 10),
            (FieldType::DurationV2, 24),
            (FieldType::InlineJsonBlob, 100),
            (FieldType::SingleChoice, 100),
            (FieldType::String, 100),
            (FieldType::TimeV2, 12),
        ];

        for (field_type, expected) in cases {
            let field = FieldDefinition::new("dummy", field_type);
            assert_eq!(
                policy.max_length_for_field(&field),
                expected,
                "default width of {field_type}"
            );
        }
    }

    #[test]
    fn explicit_max_length_wins() {
        let policy = FieldTypeWidthPolicy::default();
        let field = FieldDefinition::new("dummy", FieldType::String).with_max_length(256);

        assert_eq!(policy.max_length_for_field(&field), 256);
    }

    #[test]
    fn configured_override_replaces_default_but_not_explicit_width() {
        let config = ColumnWidthConfig {
            overrides: BTreeMap::from([("calendar_date".to_owned(), 16)]),
        };
        let policy = FieldTypeWidthPolicy::from_config(&config).unwrap();

        let date = FieldDefinition::new("date", FieldType::CalendarDate);
        assert_eq!(policy.max_length_for_field(&date), 16);

        let explicit = date.with_max_length(11);
        assert_eq!(policy.max_length_for_field(&explicit), 11);
    }

    #[test]
    fn unknown_override_is_a_config_error() {
        let config = ColumnWidthConfig {
            overrides: BTreeMap::from([("geo_point".to_owned(), 16)]),
        };

        let err = FieldTypeWidthPolicy::from_config(&config).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert_eq!(err.detail(), Some("unknown field type `geo_point`"));
    }

    #[test]
    fn only_string_columns_get_a_max_length() {
        let policy = FieldTypeWidthPolicy::default();

        let time =
            column_definition_for_field(&FieldDefinition::new("t", FieldType::TimeV2), &policy);
        assert_eq!(time, ColumnDefinition::string("t", 12));

        let int = column_definition_for_field(&FieldDefinition::new("n", FieldType::Int), &policy);
        assert_eq!(int, ColumnDefinition::new("n", ColumnType::Integer));

        let attachment =
            column_definition_for_field(&FieldDefinition::new("a", FieldType::Attachment), &policy);
        assert_eq!(attachment.column_type, ColumnType::FileHandleId);
        assert_eq!(attachment.max_length, None);
    }
}
