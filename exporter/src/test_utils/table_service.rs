use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use csv::ReaderBuilder;
use tokio::sync::Mutex;
use tracing::debug;

use crate::remote::{
    AccessControlList, CsvTableDescriptor, FileHandle, RemoteError, RowSet, StackStatus,
    StackStatusKind, TableChangeRequest, TableChangeResponse, TableEntity, TableService,
    UploadToTableResult,
};
use crate::schema::ColumnDefinition;

/// Operations of [`TableService`], used to queue failures and to inspect recorded calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableOperation {
    CreateColumnModels,
    CreateTable,
    CreateAcl,
    GetTable,
    UpdateTable,
    GetColumnModelsForTable,
    AppendRowsToTable,
    CreateFileHandle,
    DownloadFileHandle,
    StackStatus,
    StartTableTransaction,
    GetTableTransactionResult,
    UploadCsvToTableStart,
    UploadCsvToTableGet,
}

#[derive(Debug)]
enum JobResult {
    Transaction(Vec<TableChangeResponse>),
    Upload(UploadToTableResult),
}

#[derive(Debug)]
struct ScriptedJob {
    table_id: String,
    remaining_pending_polls: u32,
    result: Result<JobResult, RemoteError>,
}

#[derive(Debug)]
struct Inner {
    calls: Vec<TableOperation>,
    failures: HashMap<TableOperation, VecDeque<RemoteError>>,
    stack_status: StackStatus,
    pending_polls: u32,
    next_id: u64,
    columns: HashMap<String, ColumnDefinition>,
    tables: HashMap<String, TableEntity>,
    table_rows: HashMap<String, Vec<Vec<String>>>,
    acls: HashMap<String, AccessControlList>,
    files: HashMap<String, Vec<u8>>,
    jobs: HashMap<String, ScriptedJob>,
}

impl Inner {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    /// Records the call and returns the next queued failure of `operation`, if any.
    fn begin(&mut self, operation: TableOperation) -> Result<(), RemoteError> {
        self.calls.push(operation);

        match self
            .failures
            .get_mut(&operation)
            .and_then(|failures| failures.pop_front())
        {
            Some(err) => {
                debug!(?operation, error = %err, "replaying scripted failure");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn table_mut(&mut self, table_id: &str) -> Result<&mut TableEntity, RemoteError> {
        self.tables
            .get_mut(table_id)
            .ok_or_else(|| RemoteError::NotFound(format!("table {table_id}")))
    }

    fn bump_etag(&mut self, table_id: &str) -> Result<(), RemoteError> {
        let etag = self.next_id("etag");
        self.table_mut(table_id)?.etag = Some(etag);

        Ok(())
    }

    fn start_job(&mut self, table_id: &str, result: Result<JobResult, RemoteError>) -> String {
        let token = self.next_id("job");
        self.jobs.insert(
            token.clone(),
            ScriptedJob {
                table_id: table_id.to_owned(),
                remaining_pending_polls: self.pending_polls,
                result,
            },
        );

        token
    }

    /// Returns the result of a job, or [`RemoteError::NotReady`] while it has pending polls left.
    fn poll_job(&mut self, job_token: &str, table_id: &str) -> Result<&JobResult, RemoteError> {
        let job = self
            .jobs
            .get_mut(job_token)
            .filter(|job| job.table_id == table_id)
            .ok_or_else(|| RemoteError::NotFound(format!("job {job_token}")))?;

        if job.remaining_pending_polls > 0 {
            job.remaining_pending_polls -= 1;
            return Err(RemoteError::NotReady);
        }

        job.result.as_ref().map_err(|err| err.clone())
    }

    fn apply_change(
        &mut self,
        table_id: &str,
        change: &TableChangeRequest,
    ) -> Result<TableChangeResponse, RemoteError> {
        match change {
            TableChangeRequest::Schema { changes } => {
                for change in changes {
                    if !self.columns.contains_key(&change.new_column_id) {
                        return Err(RemoteError::JobFailed(format!(
                            "unknown column {}",
                            change.new_column_id
                        )));
                    }
                }

                let table = self.table_mut(table_id)?;
                for change in changes {
                    match &change.old_column_id {
                        Some(old_column_id) => {
                            let Some(position) =
                                table.column_ids.iter().position(|id| id == old_column_id)
                            else {
                                return Err(RemoteError::JobFailed(format!(
                                    "column {old_column_id} is not part of table {table_id}"
                                )));
                            };
                            table.column_ids[position] = change.new_column_id.clone();
                        }
                        None => table.column_ids.push(change.new_column_id.clone()),
                    }
                }

                let column_ids = table.column_ids.clone();
                self.bump_etag(table_id)?;

                Ok(TableChangeResponse::Schema {
                    columns: column_ids
                        .iter()
                        .filter_map(|id| self.columns.get(id).cloned())
                        .collect(),
                })
            }
            TableChangeRequest::AppendRows(row_set) => {
                let rows_appended = self.append_rows(table_id, row_set)?;

                Ok(TableChangeResponse::AppendRows { rows_appended })
            }
        }
    }

    fn append_rows(&mut self, table_id: &str, row_set: &RowSet) -> Result<u64, RemoteError> {
        self.table_mut(table_id)?;

        let rows = self.table_rows.entry(table_id.to_owned()).or_default();
        for row in &row_set.rows {
            rows.push(
                row.iter()
                    .map(|value| value.clone().unwrap_or_default())
                    .collect(),
            );
        }

        Ok(row_set.rows.len() as u64)
    }

    fn load_delimited_file(
        &mut self,
        table_id: &str,
        content: &[u8],
        descriptor: &CsvTableDescriptor,
    ) -> Result<UploadToTableResult, RemoteError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(descriptor.separator as u8)
            .quote(descriptor.quote_character as u8)
            .has_headers(descriptor.is_first_line_header)
            .from_reader(content);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| RemoteError::JobFailed(err.to_string()))?;
            rows.push(record.iter().map(str::to_owned).collect::<Vec<_>>());
        }

        let rows_processed = rows.len() as u64;
        self.table_rows
            .entry(table_id.to_owned())
            .or_default()
            .extend(rows);
        self.bump_etag(table_id)?;

        Ok(UploadToTableResult {
            rows_processed,
            etag: self.table_mut(table_id)?.etag.clone(),
        })
    }
}

/// In-memory [`TableService`] for tests.
///
/// Assigns ids to created entities, applies table transactions and TSV uploads to its own state and
/// lets tests queue failures per operation. Jobs answer [`RemoteError::NotReady`] for the configured
/// number of polls before returning their result. Clones share the same state.
#[derive(Debug, Clone)]
pub struct ScriptedTableService {
    inner: Arc<Mutex<Inner>>,
}

impl Default for ScriptedTableService {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTableService {
    pub fn new() -> Self {
        let inner = Inner {
            calls: Vec::new(),
            failures: HashMap::new(),
            stack_status: StackStatus {
                status: StackStatusKind::ReadWrite,
                current_message: None,
            },
            pending_polls: 0,
            next_id: 0,
            columns: HashMap::new(),
            tables: HashMap::new(),
            table_rows: HashMap::new(),
            acls: HashMap::new(),
            files: HashMap::new(),
            jobs: HashMap::new(),
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Queues `error` as the result of the next call of `operation`.
    pub async fn fail_next(&self, operation: TableOperation, error: RemoteError) {
        self.inner
            .lock()
            .await
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    pub async fn set_stack_status(&self, status: StackStatusKind, message: Option<&str>) {
        self.inner.lock().await.stack_status = StackStatus {
            status,
            current_message: message.map(str::to_owned),
        };
    }

    /// Sets how many polls of each job started from now on answer [`RemoteError::NotReady`].
    pub async fn set_pending_polls(&self, pending_polls: u32) {
        self.inner.lock().await.pending_polls = pending_polls;
    }

    /// Creates a table directly, bypassing call recording and failures.
    pub async fn insert_table(&self, name: &str, columns: Vec<ColumnDefinition>) -> String {
        let mut inner = self.inner.lock().await;

        let mut column_ids = Vec::with_capacity(columns.len());
        for column in columns {
            let id = inner.next_id("column");
            column_ids.push(id.clone());
            inner.columns.insert(id.clone(), column.with_id(id));
        }

        let table_id = inner.next_id("table");
        let etag = inner.next_id("etag");
        inner.tables.insert(
            table_id.clone(),
            TableEntity {
                id: Some(table_id.clone()),
                name: name.to_owned(),
                parent_id: "project".to_owned(),
                column_ids,
                etag: Some(etag),
            },
        );

        table_id
    }

    pub async fn calls(&self) -> Vec<TableOperation> {
        self.inner.lock().await.calls.clone()
    }

    /// Returns how many times `operation` was called.
    pub async fn call_count(&self, operation: TableOperation) -> usize {
        self.inner
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| **call == operation)
            .count()
    }

    pub async fn table(&self, table_id: &str) -> Option<TableEntity> {
        self.inner.lock().await.tables.get(table_id).cloned()
    }

    pub async fn table_columns(&self, table_id: &str) -> Vec<ColumnDefinition> {
        let inner = self.inner.lock().await;
        let Some(table) = inner.tables.get(table_id) else {
            return Vec::new();
        };

        table
            .column_ids
            .iter()
            .filter_map(|id| inner.columns.get(id).cloned())
            .collect()
    }

    /// Rows appended or uploaded to a table, in arrival order.
    pub async fn table_rows(&self, table_id: &str) -> Vec<Vec<String>> {
        self.inner
            .lock()
            .await
            .table_rows
            .get(table_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn acl(&self, entity_id: &str) -> Option<AccessControlList> {
        self.inner.lock().await.acls.get(entity_id).cloned()
    }

    pub async fn file_content(&self, file_handle_id: &str) -> Option<Vec<u8>> {
        self.inner.lock().await.files.get(file_handle_id).cloned()
    }
}

impl TableService for ScriptedTableService {
    async fn create_column_models(
        &self,
        columns: &[ColumnDefinition],
    ) -> Result<Vec<ColumnDefinition>, RemoteError> {
        let mut inner = self.inner.lock().await;
        inner.begin(TableOperation::CreateColumnModels)?;

        let mut created = Vec::with_capacity(columns.len());
        for column in columns {
            let column = column.clone().with_id(inner.next_id("column"));
            if let Some(id) = &column.id {
                inner.columns.insert(id.clone(), column.clone());
            }
            created.push(column);
        }

        Ok(created)
    }

    async fn create_table(&self, table: &TableEntity) -> Result<TableEntity, RemoteError> {
        let mut inner = self.inner.lock().await;
        inner.begin(TableOperation::CreateTable)?;

        let duplicate = inner
            .tables
            .values()
            .any(|existing| existing.parent_id == table.parent_id && existing.name == table.name);
        if duplicate {
            return Err(RemoteError::Conflict(format!(
                "table {} already exists in {}",
                table.name, table.parent_id
            )));
        }
        if let Some(missing) = table
            .column_ids
            .iter()
            .find(|id| !inner.columns.contains_key(*id))
        {
            return Err(RemoteError::BadRequest(format!("unknown column {missing}")));
        }

        let created = TableEntity {
            id: Some(inner.next_id("table")),
            etag: Some(inner.next_id("etag")),
            ..table.clone()
        };
        if let Some(id) = &created.id {
            inner.tables.insert(id.clone(), created.clone());
        }

        Ok(created)
    }

    async fn create_acl(&self, acl: &AccessControlList) -> Result<AccessControlList, RemoteError> {
        let mut inner = self.inner.lock().await;
        inner.begin(TableOperation::CreateAcl)?;

        if inner.acls.contains_key(&acl.id) {
            return Err(RemoteError::Conflict(format!("acl for {} already exists", acl.id)));
        }
        inner.acls.insert(acl.id.clone(), acl.clone());

        Ok(acl.clone())
    }

    async fn get_table(&self, table_id: &str) -> Result<TableEntity, RemoteError> {
        let mut inner = self.inner.lock().await;
        inner.begin(TableOperation::GetTable)?;

        Ok(inner.table_mut(table_id)?.clone())
    }

    async fn update_table(&self, table: &TableEntity) -> Result<TableEntity, RemoteError> {
        let mut inner = self.inner.lock().await;
        inner.begin(TableOperation::UpdateTable)?;

        let Some(table_id) = table.id.clone() else {
            return Err(RemoteError::BadRequest("table has no id".to_owned()));
        };
        let etag = inner.next_id("etag");
        let existing = inner.table_mut(&table_id)?;
        if existing.etag != table.etag {
            return Err(RemoteError::Conflict(format!("stale etag for table {table_id}")));
        }

        *existing = TableEntity {
            etag: Some(etag),
            ..table.clone()
        };

        Ok(existing.clone())
    }

    async fn get_column_models_for_table(
        &self,
        table_id: &str,
    ) -> Result<Vec<ColumnDefinition>, RemoteError> {
        let mut inner = self.inner.lock().await;
        inner.begin(TableOperation::GetColumnModelsForTable)?;

        let column_ids = inner.table_mut(table_id)?.column_ids.clone();

        Ok(column_ids
            .iter()
            .filter_map(|id| inner.columns.get(id).cloned())
            .collect())
    }

    async fn append_rows_to_table(
        &self,
        row_set: &RowSet,
        table_id: &str,
    ) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().await;
        inner.begin(TableOperation::AppendRowsToTable)?;

        inner.append_rows(table_id, row_set)?;

        Ok(())
    }

    async fn create_file_handle(
        &self,
        path: &Path,
        content_type: &str,
        _parent_id: &str,
    ) -> Result<FileHandle, RemoteError> {
        let mut inner = self.inner.lock().await;
        inner.begin(TableOperation::CreateFileHandle)?;

        let content = std::fs::read(path).map_err(|err| {
            RemoteError::BadRequest(format!("cannot read {}: {err}", path.display()))
        })?;
        let id = inner.next_id("file");
        inner.files.insert(id.clone(), content);

        Ok(FileHandle {
            id,
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            content_type: content_type.to_owned(),
        })
    }

    async fn download_file_handle(
        &self,
        file_handle_id: &str,
        path: &Path,
    ) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock().await;
        inner.begin(TableOperation::DownloadFileHandle)?;

        let content = inner
            .files
            .get(file_handle_id)
            .ok_or_else(|| RemoteError::NotFound(format!("file handle {file_handle_id}")))?;
        std::fs::write(path, content).map_err(|err| {
            RemoteError::Transport(format!("cannot write {}: {err}", path.display()))
        })
    }

    async fn stack_status(&self) -> Result<StackStatus, RemoteError> {
        let mut inner = self.inner.lock().await;
        inner.begin(TableOperation::StackStatus)?;

        Ok(inner.stack_status.clone())
    }

    async fn start_table_transaction(
        &self,
        changes: &[TableChangeRequest],
        table_id: &str,
    ) -> Result<String, RemoteError> {
        let mut inner = self.inner.lock().await;
        inner.begin(TableOperation::StartTableTransaction)?;
        inner.table_mut(table_id)?;

        let result = changes
            .iter()
            .map(|change| inner.apply_change(table_id, change))
            .collect::<Result<Vec<_>, _>>()
            .map(JobResult::Transaction);

        Ok(inner.start_job(table_id, result))
    }

    async fn get_table_transaction_result(
        &self,
        job_token: &str,
        table_id: &str,
    ) -> Result<Vec<TableChangeResponse>, RemoteError> {
        let mut inner = self.inner.lock().await;
        inner.begin(TableOperation::GetTableTransactionResult)?;

        match inner.poll_job(job_token, table_id)? {
            JobResult::Transaction(responses) => Ok(responses.clone()),
            JobResult::Upload(_) => Err(RemoteError::BadRequest(format!(
                "job {job_token} is not a table transaction"
            ))),
        }
    }

    async fn upload_csv_to_table_start(
        &self,
        table_id: &str,
        file_handle_id: &str,
        descriptor: &CsvTableDescriptor,
    ) -> Result<String, RemoteError> {
        let mut inner = self.inner.lock().await;
        inner.begin(TableOperation::UploadCsvToTableStart)?;
        inner.table_mut(table_id)?;

        let content = inner
            .files
            .get(file_handle_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("file handle {file_handle_id}")))?;
        let result = inner
            .load_delimited_file(table_id, &content, descriptor)
            .map(JobResult::Upload);

        Ok(inner.start_job(table_id, result))
    }

    async fn upload_csv_to_table_get(
        &self,
        job_token: &str,
        table_id: &str,
    ) -> Result<UploadToTableResult, RemoteError> {
        let mut inner = self.inner.lock().await;
        inner.begin(TableOperation::UploadCsvToTableGet)?;

        match inner.poll_job(job_token, table_id)? {
            JobResult::Upload(result) => Ok(result.clone()),
            JobResult::Transaction(_) => Err(RemoteError::BadRequest(format!(
                "job {job_token} is not a tsv upload"
            ))),
        }
    }
}
