//! Column schemas of remote tables and the rules for evolving them.
//!
//! [`is_compatible_column`] decides whether an existing column can be replaced in place by a new
//! definition without losing stored values. [`SchemaDiff`] applies that decision to whole tables.

mod column;
mod compatibility;
mod diff;
mod width;

pub use column::{ColumnDefinition, ColumnType};
pub use compatibility::{
    DOUBLE_AS_STRING_MIN_LENGTH, INTEGER_AS_STRING_MIN_LENGTH, is_compatible_column,
};
pub use diff::{ColumnChange, SchemaDiff};
pub use width::{
    DEFAULT_STRING_MAX_LENGTH, FieldDefinition, FieldType, FieldTypeWidthPolicy,
    column_definition_for_field,
};
