use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::schema::ColumnDefinition;

/// A table entity of the remote service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntity {
    /// Assigned by the remote service on creation.
    pub id: Option<String>,
    pub name: String,
    /// Project or folder the table lives in.
    pub parent_id: String,
    /// Ids of the table columns, in column order.
    pub column_ids: Vec<String>,
    /// Concurrency token, must be sent back unchanged on update.
    pub etag: Option<String>,
}

/// Permission that can be granted on a remote entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessType {
    ChangePermissions,
    ChangeSettings,
    Create,
    Delete,
    Download,
    Read,
    Update,
}

/// Set of permissions granted to one principal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceAccess {
    pub principal_id: u64,
    pub access_types: BTreeSet<AccessType>,
}

/// Access control list attached to a remote entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlList {
    /// Id of the entity the list applies to.
    pub id: String,
    pub resource_access: BTreeSet<ResourceAccess>,
}

/// Handle to a file stored by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    pub id: String,
    pub file_name: String,
    pub content_type: String,
}

/// Availability of the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackStatusKind {
    ReadWrite,
    ReadOnly,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackStatus {
    pub status: StackStatusKind,
    /// Operator message shown while the service is degraded.
    pub current_message: Option<String>,
}

/// Rows appended synchronously to a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSet {
    /// Column ids, in the order of the values of each row.
    pub column_ids: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Replaces one column of a table by another, or adds a column when `old_column_id` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnModelChange {
    pub old_column_id: Option<String>,
    pub new_column_id: String,
}

/// One change applied by a table transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableChangeRequest {
    /// Changes the columns of the table.
    Schema { changes: Vec<ColumnModelChange> },
    /// Appends rows to the table.
    AppendRows(RowSet),
}

/// Result of one [`TableChangeRequest`], in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableChangeResponse {
    /// Columns of the table after the schema change.
    Schema { columns: Vec<ColumnDefinition> },
    AppendRows { rows_appended: u64 },
}

/// Format of a delimited file uploaded to a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvTableDescriptor {
    pub separator: char,
    pub quote_character: char,
    pub line_end: String,
    pub is_first_line_header: bool,
}

impl CsvTableDescriptor {
    /// Descriptor of the TSV files written by [`crate::tsv::TsvInfo`].
    pub fn tsv() -> Self {
        Self {
            separator: '\t',
            quote_character: '"',
            line_end: "\n".to_owned(),
            is_first_line_header: true,
        }
    }
}

/// Summary of a finished bulk upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadToTableResult {
    pub rows_processed: u64,
    /// Version of the table produced by the upload.
    pub etag: Option<String>,
}
