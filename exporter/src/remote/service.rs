use std::future::Future;
use std::path::Path;

use crate::remote::error::RemoteError;
use crate::remote::model::{
    AccessControlList, CsvTableDescriptor, FileHandle, RowSet, StackStatus, TableChangeRequest,
    TableChangeResponse, TableEntity, UploadToTableResult,
};
use crate::schema::ColumnDefinition;

/// Client of the remote table service.
///
/// Every method is a single request without retries, callers go through
/// [`crate::remote::TableServiceHelper`] which applies the retry policy. The job result methods
/// return [`RemoteError::NotReady`] while the job is still running.
pub trait TableService {
    /// Creates column models and returns them with their assigned ids, in input order.
    fn create_column_models(
        &self,
        columns: &[ColumnDefinition],
    ) -> impl Future<Output = Result<Vec<ColumnDefinition>, RemoteError>> + Send;

    fn create_table(
        &self,
        table: &TableEntity,
    ) -> impl Future<Output = Result<TableEntity, RemoteError>> + Send;

    fn create_acl(
        &self,
        acl: &AccessControlList,
    ) -> impl Future<Output = Result<AccessControlList, RemoteError>> + Send;

    fn get_table(
        &self,
        table_id: &str,
    ) -> impl Future<Output = Result<TableEntity, RemoteError>> + Send;

    fn update_table(
        &self,
        table: &TableEntity,
    ) -> impl Future<Output = Result<TableEntity, RemoteError>> + Send;

    fn get_column_models_for_table(
        &self,
        table_id: &str,
    ) -> impl Future<Output = Result<Vec<ColumnDefinition>, RemoteError>> + Send;

    fn append_rows_to_table(
        &self,
        row_set: &RowSet,
        table_id: &str,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Uploads the local file at `path` and returns a handle to the stored copy.
    fn create_file_handle(
        &self,
        path: &Path,
        content_type: &str,
        parent_id: &str,
    ) -> impl Future<Output = Result<FileHandle, RemoteError>> + Send;

    /// Downloads the content of a file handle into the local file at `path`.
    fn download_file_handle(
        &self,
        file_handle_id: &str,
        path: &Path,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    fn stack_status(&self) -> impl Future<Output = Result<StackStatus, RemoteError>> + Send;

    /// Starts a table transaction and returns its job token.
    fn start_table_transaction(
        &self,
        changes: &[TableChangeRequest],
        table_id: &str,
    ) -> impl Future<Output = Result<String, RemoteError>> + Send;

    fn get_table_transaction_result(
        &self,
        job_token: &str,
        table_id: &str,
    ) -> impl Future<Output = Result<Vec<TableChangeResponse>, RemoteError>> + Send;

    /// Starts loading an uploaded delimited file into a table and returns the job token.
    fn upload_csv_to_table_start(
        &self,
        table_id: &str,
        file_handle_id: &str,
        descriptor: &CsvTableDescriptor,
    ) -> impl Future<Output = Result<String, RemoteError>> + Send;

    fn upload_csv_to_table_get(
        &self,
        job_token: &str,
        table_id: &str,
    ) -> impl Future<Output = Result<UploadToTableResult, RemoteError>> + Send;
}
