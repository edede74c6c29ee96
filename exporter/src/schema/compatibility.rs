use crate::bail;
use crate::error::{ErrorKind, ExportResult};
use crate::schema::column::{ColumnDefinition, ColumnType};

/// Minimum width of a string column holding any 64-bit integer, sign included.
pub const INTEGER_AS_STRING_MIN_LENGTH: u32 = 20;

/// Minimum width of a string column holding any double in full-precision scientific notation,
/// sign and exponent included.
pub const DOUBLE_AS_STRING_MIN_LENGTH: u32 = 23;

/// Identifies which side of a comparison a column belongs to.
#[derive(Debug, Clone, Copy)]
enum Side {
    Old,
    New,
}

impl Side {
    fn as_str(&self) -> &'static str {
        match self {
            Side::Old => "old",
            Side::New => "new",
        }
    }
}

/// Returns whether `old_column` can be replaced by `new_column` without losing stored values.
///
/// Columns with different names are never compatible, a rename has to be modeled as a new column.
/// String columns can only grow, integers can become doubles, and numbers can become strings that
/// are wide enough for their text rendering. Every other type change is incompatible.
///
/// Fails with [`ErrorKind::SchemaError`] when a string column involved in the decision has no max
/// length, since no decision can be made in that case.
pub fn is_compatible_column(
    old_column: &ColumnDefinition,
    new_column: &ColumnDefinition,
) -> ExportResult<bool> {
    if old_column.name != new_column.name {
        return Ok(false);
    }

    let old_type = old_column.column_type;
    let new_type = new_column.column_type;

    if old_type == new_type {
        if old_type != ColumnType::String {
            return Ok(true);
        }

        let old_max_length = string_max_length(old_column, Side::Old)?;
        let new_max_length = string_max_length(new_column, Side::New)?;

        return Ok(new_max_length >= old_max_length);
    }

    match (old_type, new_type) {
        (ColumnType::Integer, ColumnType::Double) => Ok(true),
        (ColumnType::Integer, ColumnType::String) => {
            let new_max_length = string_max_length(new_column, Side::New)?;
            Ok(new_max_length >= INTEGER_AS_STRING_MIN_LENGTH)
        }
        (ColumnType::Double, ColumnType::String) => {
            let new_max_length = string_max_length(new_column, Side::New)?;
            Ok(new_max_length >= DOUBLE_AS_STRING_MIN_LENGTH)
        }
        _ => Ok(false),
    }
}

fn string_max_length(column: &ColumnDefinition, side: Side) -> ExportResult<u32> {
    match column.max_length {
        Some(max_length) => Ok(max_length),
        None => bail!(
            ErrorKind::SchemaError,
            "String column has no max length",
            format!(
                "{} column {} has type STRING and no max length",
                side.as_str(),
                column.name
            )
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(column_type: ColumnType, max_length: Option<u32>) -> ColumnDefinition {
        ColumnDefinition {
            id: None,
            name: "my-column".to_owned(),
            column_type,
            max_length,
        }
    }

    #[test]
    fn renamed_column_is_incompatible() {
        let foo = ColumnDefinition::new("foo", ColumnType::Integer);
        let bar = ColumnDefinition::new("bar", ColumnType::Integer);

        assert!(!is_compatible_column(&foo, &bar).unwrap());
    }

    #[test]
    fn renamed_string_column_without_max_length_is_incompatible() {
        let old = ColumnDefinition::new("foo", ColumnType::String);
        let new = ColumnDefinition::new("bar", ColumnType::String);

        assert!(!is_compatible_column(&old, &new).unwrap());
    }

    #[test]
    fn integer_widens_to_double_but_not_back() {
        let int_column = column(ColumnType::Integer, None);
        let double_column = column(ColumnType::Double, None);

        assert!(is_compatible_column(&int_column, &double_column).unwrap());
        assert!(!is_compatible_column(&double_column, &int_column).unwrap());
    }

    #[test]
    fn same_non_string_type_ignores_max_length() {
        let cases = [
            (ColumnType::Integer, None, None),
            (ColumnType::Double, Some(10), None),
            (ColumnType::Date, Some(50), Some(5)),
            (ColumnType::Boolean, None, Some(1)),
        ];

        for (column_type, old_max_length, new_max_length) in cases {
            let old = column(column_type, old_max_length);
            let new = column(column_type, new_max_length);

            assert!(
                is_compatible_column(&old, &new).unwrap(),
                "{column_type} -> {column_type} should be compatible"
            );
        }
    }

    #[test]
    fn string_to_string_only_widens() {
        let cases = [(10, 20, true), (20, 10, false), (15, 15, true)];

        for (old_max_length, new_max_length, expected) in cases {
            let old = column(ColumnType::String, Some(old_max_length));
            let new = column(ColumnType::String, Some(new_max_length));

            assert_eq!(
                is_compatible_column(&old, &new).unwrap(),
                expected,
                "STRING({old_max_length}) -> STRING({new_max_length})"
            );
        }
    }

    #[test]
    fn numbers_to_string_require_minimum_width() {
        let cases = [
            (ColumnType::Double, 21, false),
            (ColumnType::Double, 23, true),
            (ColumnType::Integer, 19, false),
            (ColumnType::Integer, 20, true),
            (ColumnType::Integer, 21, true),
        ];

        for (old_type, new_max_length, expected) in cases {
            let old = column(old_type, None);
            let new = column(ColumnType::String, Some(new_max_length));

            assert_eq!(
                is_compatible_column(&old, &new).unwrap(),
                expected,
                "{old_type} -> STRING({new_max_length})"
            );
        }
    }

    #[test]
    fn other_type_changes_are_incompatible() {
        let cases = [
            (ColumnType::String, ColumnType::Integer),
            (ColumnType::String, ColumnType::LargeText),
            (ColumnType::Date, ColumnType::Integer),
            (ColumnType::Boolean, ColumnType::String),
            (ColumnType::Double, ColumnType::Integer),
        ];

        for (old_type, new_type) in cases {
            let old = column(old_type, Some(100));
            let new = column(new_type, Some(100));

            assert!(
                !is_compatible_column(&old, &new).unwrap(),
                "{old_type} -> {new_type} should be incompatible"
            );
        }
    }

    #[test]
    fn old_string_without_max_length_is_a_schema_error() {
        let old = ColumnDefinition::new("my-string", ColumnType::String);
        let new = ColumnDefinition::string("my-string", 42);

        let err = is_compatible_column(&old, &new).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SchemaError);
        assert_eq!(
            err.detail(),
            Some("old column my-string has type STRING and no max length")
        );
    }

    #[test]
    fn new_string_without_max_length_is_a_schema_error() {
        let old = ColumnDefinition::string("my-string", 42);
        let new = ColumnDefinition::new("my-string", ColumnType::String);

        let err = is_compatible_column(&old, &new).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SchemaError);
        assert_eq!(
            err.detail(),
            Some("new column my-string has type STRING and no max length")
        );
    }

    #[test]
    fn number_to_string_without_max_length_is_a_schema_error() {
        let old = column(ColumnType::Double, None);
        let new = column(ColumnType::String, None);

        let err = is_compatible_column(&old, &new).unwrap_err();

        assert_eq!(
            err.detail(),
            Some("new column my-column has type STRING and no max length")
        );
    }
}
