//! Access to the remote table service.
//!
//! [`TableService`] is the raw client interface. [`TableServiceHelper`] wraps every call in the
//! retry policy of [`retry`] and exposes the asynchronous jobs of the service as start and poll
//! pairs built on [`job`].

mod error;
mod helper;
pub mod job;
mod model;
pub mod retry;
mod service;

pub use error::{RemoteError, is_retryable_remote_error};
pub use helper::{ACCESS_TYPE_ALL, ACCESS_TYPE_READ, TableServiceHelper};
pub use model::{
    AccessControlList, AccessType, ColumnModelChange, CsvTableDescriptor, FileHandle,
    ResourceAccess, RowSet, StackStatus, StackStatusKind, TableChangeRequest, TableChangeResponse,
    TableEntity, UploadToTableResult,
};
pub use service::TableService;
