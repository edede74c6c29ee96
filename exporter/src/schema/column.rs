use std::fmt;

use serde::{Deserialize, Serialize};

/// Type of a column in a remote table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    Integer,
    Double,
    String,
    Date,
    Boolean,
    FileHandleId,
    LargeText,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Double => "DOUBLE",
            ColumnType::String => "STRING",
            ColumnType::Date => "DATE",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::FileHandleId => "FILEHANDLEID",
            ColumnType::LargeText => "LARGETEXT",
        };

        f.write_str(name)
    }
}

/// A named, typed column of a remote table.
///
/// `id` is assigned by the remote service when the column is created and is `None` for columns
/// that only exist locally. Columns are matched by `name` when comparing schemas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub id: Option<String>,
    pub name: String,
    pub column_type: ColumnType,
    pub max_length: Option<u32>,
}

impl ColumnDefinition {
    /// Creates a column without a remote id or max length.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            id: None,
            name: name.into(),
            column_type,
            max_length: None,
        }
    }

    /// Creates a [`ColumnType::String`] column holding at most `max_length` characters.
    pub fn string(name: impl Into<String>, max_length: u32) -> Self {
        Self::new(name, ColumnType::String).with_max_length(max_length)
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Returns `true` if both columns describe the same slot, ignoring the remote id.
    pub fn same_definition(&self, other: &ColumnDefinition) -> bool {
        self.name == other.name
            && self.column_type == other.column_type
            && self.max_length == other.max_length
    }
}
