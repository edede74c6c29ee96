use tracing::debug;

use crate::error::{ExportError, ExportResult};
use crate::schema::column::ColumnDefinition;
use crate::schema::compatibility::is_compatible_column;

/// A column that has to be created or replaced on the remote table.
///
/// `old` is `None` for columns that are added to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnChange {
    pub old: Option<ColumnDefinition>,
    pub new: ColumnDefinition,
}

/// Difference between the columns of a remote table and the columns an export needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    changes: Vec<ColumnChange>,
    incompatible: Vec<String>,
}

impl SchemaDiff {
    /// Compares the `existing` columns of a table with the `desired` columns of an export.
    ///
    /// Desired columns that are missing from the table are added, compatible changes replace the
    /// existing column in place, and incompatible changes are reported by name and leave the
    /// existing column untouched. Existing columns that are not desired are kept.
    ///
    /// Schema errors of all columns are collected and returned together.
    pub fn compute(
        existing: &[ColumnDefinition],
        desired: &[ColumnDefinition],
    ) -> ExportResult<SchemaDiff> {
        let mut diff = SchemaDiff::default();
        let mut errors: Vec<ExportError> = Vec::new();

        for desired_column in desired {
            let Some(existing_column) = existing
                .iter()
                .find(|column| column.name == desired_column.name)
            else {
                diff.changes.push(ColumnChange {
                    old: None,
                    new: desired_column.clone(),
                });
                continue;
            };

            if existing_column.same_definition(desired_column) {
                continue;
            }

            match is_compatible_column(existing_column, desired_column) {
                Ok(true) => diff.changes.push(ColumnChange {
                    old: Some(existing_column.clone()),
                    new: desired_column.clone(),
                }),
                Ok(false) => {
                    debug!(
                        column = %desired_column.name,
                        old_type = %existing_column.column_type,
                        new_type = %desired_column.column_type,
                        "incompatible column change"
                    );
                    diff.incompatible.push(desired_column.name.clone());
                }
                Err(err) => errors.push(err),
            }
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(diff)
    }

    /// Columns to create on the remote service, in desired order.
    pub fn changes(&self) -> &[ColumnChange] {
        &self.changes
    }

    /// Names of desired columns that cannot replace the existing column of the same name.
    pub fn incompatible(&self) -> &[String] {
        &self.incompatible
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::column::ColumnType;

    #[test]
    fn unchanged_schema_has_no_changes() {
        let columns = vec![
            ColumnDefinition::string("record_id", 36).with_id("1"),
            ColumnDefinition::new("score", ColumnType::Integer).with_id("2"),
        ];
        let desired = vec![
            ColumnDefinition::string("record_id", 36),
            ColumnDefinition::new("score", ColumnType::Integer),
        ];

        let diff = SchemaDiff::compute(&columns, &desired).unwrap();

        assert!(!diff.has_changes());
        assert!(diff.incompatible().is_empty());
    }

    #[test]
    fn classifies_added_widened_and_incompatible_columns() {
        let existing = vec![
            ColumnDefinition::string("answer", 10).with_id("1"),
            ColumnDefinition::new("score", ColumnType::Double).with_id("2"),
            ColumnDefinition::new("kept", ColumnType::Boolean).with_id("3"),
        ];
        let desired = vec![
            ColumnDefinition::string("answer", 50),
            ColumnDefinition::new("score", ColumnType::Integer),
            ColumnDefinition::string("comment", 100),
        ];

        let diff = SchemaDiff::compute(&existing, &desired).unwrap();

        assert_eq!(
            diff.changes(),
            &[
                ColumnChange {
                    old: Some(existing[0].clone()),
                    new: desired[0].clone(),
                },
                ColumnChange {
                    old: None,
                    new: desired[2].clone(),
                },
            ]
        );
        assert_eq!(diff.incompatible(), &["score".to_owned()]);
    }

    #[test]
    fn collects_schema_errors_of_all_columns() {
        let existing = vec![
            ColumnDefinition::new("a", ColumnType::String),
            ColumnDefinition::string("b", 10),
        ];
        let desired = vec![
            ColumnDefinition::string("a", 10),
            ColumnDefinition::new("b", ColumnType::String),
        ];

        let err = SchemaDiff::compute(&existing, &desired).unwrap_err();

        assert_eq!(
            err.kinds(),
            vec![ErrorKind::SchemaError, ErrorKind::SchemaError]
        );
    }
}
