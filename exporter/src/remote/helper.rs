use std::collections::BTreeSet;
use std::future::Future;
use std::io::Write;
use std::path::Path;

use config::shared::{ExporterConfig, JobPollConfig};
use tracing::{info, warn};

use crate::bail;
use crate::error::{ErrorKind, ExportResult};
use crate::remote::error::{RemoteError, is_retryable_remote_error};
use crate::remote::job::{JobHandle, JobKind, PollOutcome, wait_for_job};
use crate::remote::model::{
    AccessControlList, AccessType, ColumnModelChange, CsvTableDescriptor, FileHandle,
    ResourceAccess, RowSet, StackStatusKind, TableChangeRequest, TableChangeResponse, TableEntity,
    UploadToTableResult,
};
use crate::remote::retry::RetryPolicy;
use crate::remote::service::TableService;
use crate::schema::{ColumnDefinition, SchemaDiff};
use crate::tsv::TsvInfo;

/// Permissions granted to the principal that owns exported tables.
pub const ACCESS_TYPE_ALL: &[AccessType] = &[
    AccessType::ChangePermissions,
    AccessType::ChangeSettings,
    AccessType::Create,
    AccessType::Delete,
    AccessType::Download,
    AccessType::Read,
    AccessType::Update,
];

/// Permissions granted to the team allowed to read exported tables.
pub const ACCESS_TYPE_READ: &[AccessType] = &[AccessType::Download, AccessType::Read];

/// Maps [`RemoteError::NotReady`] to [`PollOutcome::Pending`] and keeps every other failure.
async fn not_ready_as_pending<T, Fut>(request: Fut) -> Result<PollOutcome<T>, RemoteError>
where
    Fut: Future<Output = Result<T, RemoteError>>,
{
    match request.await {
        Ok(result) => Ok(PollOutcome::Ready(result)),
        Err(RemoteError::NotReady) => Ok(PollOutcome::Pending),
        Err(err) => Err(err),
    }
}

/// Calls the remote table service through the retry policy.
///
/// Each method issues one logical request. Transient failures are retried according to the
/// configured [`RetryPolicy`], everything else is returned as an [`crate::error::ExportError`].
#[derive(Debug, Clone)]
pub struct TableServiceHelper<S> {
    service: S,
    retry_policy: RetryPolicy,
    job_poll: JobPollConfig,
}

impl<S> TableServiceHelper<S>
where
    S: TableService,
{
    pub fn new(service: S, config: &ExporterConfig) -> Self {
        Self::with_policy(
            service,
            RetryPolicy::from_config(&config.retry),
            config.job_poll.clone(),
        )
    }

    pub fn with_policy(service: S, retry_policy: RetryPolicy, job_poll: JobPollConfig) -> Self {
        Self {
            service,
            retry_policy,
            job_poll,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn create_column_models(
        &self,
        columns: &[ColumnDefinition],
    ) -> ExportResult<Vec<ColumnDefinition>> {
        self.retry_policy
            .call(
                "create_column_models",
                || self.service.create_column_models(columns),
                is_retryable_remote_error,
            )
            .await
    }

    pub async fn create_table(&self, table: &TableEntity) -> ExportResult<TableEntity> {
        self.retry_policy
            .call(
                "create_table",
                || self.service.create_table(table),
                is_retryable_remote_error,
            )
            .await
    }

    pub async fn create_acl(&self, acl: &AccessControlList) -> ExportResult<AccessControlList> {
        self.retry_policy
            .call(
                "create_acl",
                || self.service.create_acl(acl),
                is_retryable_remote_error,
            )
            .await
    }

    pub async fn get_table(&self, table_id: &str) -> ExportResult<TableEntity> {
        self.retry_policy
            .call(
                "get_table",
                || self.service.get_table(table_id),
                is_retryable_remote_error,
            )
            .await
    }

    pub async fn update_table(&self, table: &TableEntity) -> ExportResult<TableEntity> {
        self.retry_policy
            .call(
                "update_table",
                || self.service.update_table(table),
                is_retryable_remote_error,
            )
            .await
    }

    pub async fn get_column_models_for_table(
        &self,
        table_id: &str,
    ) -> ExportResult<Vec<ColumnDefinition>> {
        self.retry_policy
            .call(
                "get_column_models_for_table",
                || self.service.get_column_models_for_table(table_id),
                is_retryable_remote_error,
            )
            .await
    }

    pub async fn append_rows_to_table(&self, row_set: &RowSet, table_id: &str) -> ExportResult<()> {
        self.retry_policy
            .call(
                "append_rows_to_table",
                || self.service.append_rows_to_table(row_set, table_id),
                is_retryable_remote_error,
            )
            .await
    }

    pub async fn create_file_handle(
        &self,
        path: &Path,
        content_type: &str,
        parent_id: &str,
    ) -> ExportResult<FileHandle> {
        self.retry_policy
            .call(
                "create_file_handle",
                || self.service.create_file_handle(path, content_type, parent_id),
                is_retryable_remote_error,
            )
            .await
    }

    pub async fn download_file_handle(
        &self,
        file_handle_id: &str,
        path: &Path,
    ) -> ExportResult<()> {
        self.retry_policy
            .call(
                "download_file_handle",
                || self.service.download_file_handle(file_handle_id, path),
                is_retryable_remote_error,
            )
            .await
    }

    /// Returns `true` if the remote service currently accepts writes.
    ///
    /// Only [`StackStatusKind::ReadWrite`] allows exports, read-only and down both block them.
    pub async fn is_writable(&self) -> ExportResult<bool> {
        let status = self
            .retry_policy
            .call(
                "stack_status",
                || self.service.stack_status(),
                is_retryable_remote_error,
            )
            .await?;

        if status.status != StackStatusKind::ReadWrite {
            warn!(
                status = ?status.status,
                message = status.current_message.as_deref().unwrap_or(""),
                "remote table service is not writable"
            );
            return Ok(false);
        }

        Ok(true)
    }

    /// Creates a table with the given columns and grants access to it.
    ///
    /// Creates the columns, then the table `table_name` under `parent_id` with the created column
    /// ids in order, then an ACL granting `principal_id` full access and `data_access_team_id` read
    /// access. Returns the id of the new table.
    pub async fn create_table_with_columns_and_acls(
        &self,
        columns: &[ColumnDefinition],
        data_access_team_id: u64,
        principal_id: u64,
        parent_id: &str,
        table_name: &str,
    ) -> ExportResult<String> {
        let created_columns = self.create_column_models(columns).await?;
        let column_ids = collect_column_ids(&created_columns)?;

        let table = TableEntity {
            name: table_name.to_owned(),
            parent_id: parent_id.to_owned(),
            column_ids,
            ..TableEntity::default()
        };
        let created_table = self.create_table(&table).await?;
        let Some(table_id) = created_table.id else {
            bail!(
                ErrorKind::RemoteServiceError,
                "Remote service created a table without an id",
                table_name
            );
        };

        let acl = AccessControlList {
            id: table_id.clone(),
            resource_access: BTreeSet::from([
                ResourceAccess {
                    principal_id,
                    access_types: ACCESS_TYPE_ALL.iter().copied().collect(),
                },
                ResourceAccess {
                    principal_id: data_access_team_id,
                    access_types: ACCESS_TYPE_READ.iter().copied().collect(),
                },
            ]),
        };
        self.create_acl(&acl).await?;

        info!(
            table_id = %table_id,
            table_name,
            parent_id,
            "created table with columns and acls"
        );

        Ok(table_id)
    }

    /// Submits a table transaction and returns the handle to poll it with.
    pub async fn start_table_transaction(
        &self,
        changes: &[TableChangeRequest],
        table_id: &str,
    ) -> ExportResult<JobHandle> {
        let token = self
            .retry_policy
            .call(
                "start_table_transaction",
                || self.service.start_table_transaction(changes, table_id),
                is_retryable_remote_error,
            )
            .await?;

        info!(table_id, job_token = %token, "started table transaction");

        Ok(JobHandle::new(JobKind::TableTransaction, token, table_id))
    }

    /// Polls a table transaction once.
    pub async fn get_table_transaction_result(
        &self,
        handle: &JobHandle,
    ) -> ExportResult<PollOutcome<Vec<TableChangeResponse>>> {
        self.retry_policy
            .call(
                "get_table_transaction_result",
                || {
                    not_ready_as_pending(
                        self.service
                            .get_table_transaction_result(handle.token(), handle.table_id()),
                    )
                },
                is_retryable_remote_error,
            )
            .await
    }

    /// Waits for a table transaction using the configured poll budget.
    pub async fn wait_for_table_transaction(
        &self,
        handle: &JobHandle,
    ) -> ExportResult<Vec<TableChangeResponse>> {
        wait_for_job(handle, &self.job_poll, |_| {
            self.get_table_transaction_result(handle)
        })
        .await
    }

    /// Starts loading an uploaded TSV file into a table.
    pub async fn upload_tsv_start(
        &self,
        table_id: &str,
        file_handle_id: &str,
        descriptor: &CsvTableDescriptor,
    ) -> ExportResult<JobHandle> {
        let token = self
            .retry_policy
            .call(
                "upload_tsv_start",
                || {
                    self.service
                        .upload_csv_to_table_start(table_id, file_handle_id, descriptor)
                },
                is_retryable_remote_error,
            )
            .await?;

        info!(table_id, file_handle_id, job_token = %token, "started tsv upload");

        Ok(JobHandle::new(JobKind::TsvUpload, token, table_id))
    }

    /// Polls a TSV upload once.
    pub async fn get_upload_tsv_status(
        &self,
        handle: &JobHandle,
    ) -> ExportResult<PollOutcome<UploadToTableResult>> {
        self.retry_policy
            .call(
                "get_upload_tsv_status",
                || {
                    not_ready_as_pending(
                        self.service
                            .upload_csv_to_table_get(handle.token(), handle.table_id()),
                    )
                },
                is_retryable_remote_error,
            )
            .await
    }

    /// Waits for a TSV upload using the configured poll budget.
    pub async fn wait_for_tsv_upload(
        &self,
        handle: &JobHandle,
    ) -> ExportResult<UploadToTableResult> {
        wait_for_job(handle, &self.job_poll, |_| self.get_upload_tsv_status(handle)).await
    }

    /// Applies the compatible column changes of `diff` to a table.
    ///
    /// Creates the new column models, replaces or adds them in one table transaction and waits for
    /// it. Returns the columns of the table after the change, or `None` when there was nothing to
    /// change.
    pub async fn apply_schema_diff(
        &self,
        table_id: &str,
        diff: &SchemaDiff,
    ) -> ExportResult<Option<Vec<ColumnDefinition>>> {
        if !diff.has_changes() {
            return Ok(None);
        }

        let new_columns: Vec<ColumnDefinition> =
            diff.changes().iter().map(|change| change.new.clone()).collect();
        let created_columns = self.create_column_models(&new_columns).await?;
        let new_column_ids = collect_column_ids(&created_columns)?;

        let changes = diff
            .changes()
            .iter()
            .zip(new_column_ids)
            .map(|(change, new_column_id)| ColumnModelChange {
                old_column_id: change.old.as_ref().and_then(|old| old.id.clone()),
                new_column_id,
            })
            .collect();

        let handle = self
            .start_table_transaction(&[TableChangeRequest::Schema { changes }], table_id)
            .await?;
        let responses = self.wait_for_table_transaction(&handle).await?;

        for response in responses {
            if let TableChangeResponse::Schema { columns } = response {
                return Ok(Some(columns));
            }
        }

        bail!(
            ErrorKind::RemoteServiceError,
            "Table transaction returned no schema change result",
            handle
        );
    }

    /// Uploads a closed TSV buffer and loads it into `table_id`.
    ///
    /// Fails with the buffer's initialization error if it never became active, and with
    /// [`ErrorKind::InvalidState`] while its writer is still open.
    pub async fn upload_tsv<W: Write>(
        &self,
        tsv: &TsvInfo<W>,
        table_id: &str,
        parent_id: &str,
        content_type: &str,
    ) -> ExportResult<UploadToTableResult> {
        tsv.check_init()?;
        if !tsv.is_closed() {
            bail!(
                ErrorKind::InvalidState,
                "TSV buffer must be flushed and closed before upload",
                table_id
            );
        }
        let Some(path) = tsv.file() else {
            bail!(
                ErrorKind::InvalidState,
                "TSV buffer has no file to upload",
                table_id
            );
        };

        let file_handle = self
            .create_file_handle(path, content_type, parent_id)
            .await?;
        let handle = self
            .upload_tsv_start(table_id, &file_handle.id, &CsvTableDescriptor::tsv())
            .await?;
        let result = self.wait_for_tsv_upload(&handle).await?;

        info!(
            table_id,
            rows_written = tsv.line_count(),
            rows_processed = result.rows_processed,
            "uploaded tsv to table"
        );

        Ok(result)
    }
}

fn collect_column_ids(columns: &[ColumnDefinition]) -> ExportResult<Vec<String>> {
    columns
        .iter()
        .map(|column| match &column.id {
            Some(id) => Ok(id.clone()),
            None => bail!(
                ErrorKind::RemoteServiceError,
                "Remote service created a column without an id",
                column.name
            ),
        })
        .collect()
}
