//! Tab separated buffer for one export batch.
//!
//! A [`TsvInfo`] owns the column names of a batch, writes a header line once and then one line per
//! row in column order. Write failures of the destination are latched and surface when the buffer is
//! flushed and closed. A buffer whose destination could not be set up is created in a failed state
//! and re-raises that cause from every operation.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::{QuoteStyle, Terminator, WriterBuilder};
use tracing::{debug, error, warn};

use crate::error::{ErrorKind, ExportError, ExportResult, SharedSource};
use crate::{bail, export_error};

/// Rows buffered for a bulk upload, or the error that prevented the buffer from being created.
#[derive(Debug)]
pub struct TsvInfo<W: Write = File> {
    state: BufferState<W>,
}

#[derive(Debug)]
enum BufferState<W: Write> {
    Active(ActiveBuffer<W>),
    /// Terminal, no operation leaves this state.
    Failed(SharedSource),
}

#[derive(Debug)]
struct ActiveBuffer<W: Write> {
    column_names: Vec<String>,
    file: Option<PathBuf>,
    writer: LatchedWriter<W>,
    line_count: usize,
    record_ids: Vec<String>,
}

/// Tab separated writer that keeps the first error of the destination instead of returning it.
#[derive(Debug)]
struct LatchedWriter<W: Write> {
    /// `None` once the writer has been closed.
    inner: Option<csv::Writer<W>>,
    error: Option<SharedSource>,
}

fn tab_writer<W: Write>(destination: W) -> csv::Writer<W> {
    WriterBuilder::new()
        .delimiter(b'\t')
        .quote(b'"')
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(destination)
}

impl<W: Write> LatchedWriter<W> {
    fn new(writer: W) -> Self {
        Self {
            inner: Some(tab_writer(writer)),
            error: None,
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    fn write_record<S: AsRef<[u8]>>(&mut self, record: &[S]) {
        if self.error.is_some() {
            return;
        }

        let result = if matches!(record, [field] if field.as_ref().is_empty()) {
            self.write_empty_line()
        } else if let Some(inner) = self.inner.as_mut() {
            inner
                .write_record(record)
                .map_err(|err| -> SharedSource { Arc::new(err) })
        } else {
            return;
        };

        if let Err(err) = result {
            error!(error = %err, "tsv writer failed to write a line");
            self.error = Some(err);
        }
    }

    /// Writes a bare line terminator.
    ///
    /// The csv writer quotes a lone empty field as `""`, so the line bypasses it and goes to the
    /// destination directly.
    fn write_empty_line(&mut self) -> Result<(), SharedSource> {
        let Some(writer) = self.inner.take() else {
            return Ok(());
        };

        let mut destination = match writer.into_inner() {
            Ok(destination) => destination,
            Err(err) => {
                let cause: SharedSource =
                    Arc::new(io::Error::new(err.error().kind(), err.error().to_string()));
                self.inner = Some(err.into_inner());
                return Err(cause);
            }
        };
        let result = destination
            .write_all(b"\n")
            .map_err(|err| -> SharedSource { Arc::new(err) });
        self.inner = Some(tab_writer(destination));

        result
    }

    /// Flushes the destination and returns the latched error, if any.
    fn flush(&mut self) -> Option<&SharedSource> {
        if self.error.is_none() {
            if let Some(inner) = self.inner.as_mut() {
                if let Err(err) = inner.flush() {
                    error!(error = %err, "tsv writer failed to flush");
                    self.error = Some(Arc::new(err));
                }
            }
        }

        self.error.as_ref()
    }

    fn close(&mut self) {
        self.inner = None;
    }
}

impl TsvInfo<File> {
    /// Creates the file at `path` and returns a buffer writing to it.
    ///
    /// If the file cannot be created the buffer starts in the failed state with the I/O error as
    /// its cause.
    pub fn create(column_names: Vec<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        match File::create(&path) {
            Ok(file) => Self::new(column_names, Some(path), file),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to create tsv file");
                Self::from_init_error(Arc::new(err))
            }
        }
    }
}

impl<W: Write> TsvInfo<W> {
    /// Creates an active buffer writing to `writer` and writes the header line.
    ///
    /// `file` is the path `writer` writes to, if it is backed by a file.
    pub fn new(column_names: Vec<String>, file: Option<PathBuf>, writer: W) -> Self {
        let mut buffer = ActiveBuffer {
            column_names,
            file,
            writer: LatchedWriter::new(writer),
            line_count: 0,
            record_ids: Vec::new(),
        };
        buffer.writer.write_record(&buffer.column_names);

        Self {
            state: BufferState::Active(buffer),
        }
    }

    /// Creates a buffer in the failed state from the error that prevented its initialization.
    ///
    /// The destination is never touched and every operation fails with `cause` as source.
    pub fn from_init_error(cause: SharedSource) -> Self {
        Self {
            state: BufferState::Failed(cause),
        }
    }

    /// Fails with the initialization error if the buffer is in the failed state.
    pub fn check_init(&self) -> ExportResult<()> {
        match &self.state {
            BufferState::Active(_) => Ok(()),
            BufferState::Failed(cause) => Err(init_error(cause)),
        }
    }

    /// Writes one line with the value of each column, or an empty field for missing columns.
    ///
    /// Keys of `fields` that are not columns of the buffer are ignored.
    pub fn write_row(&mut self, fields: &HashMap<String, String>) -> ExportResult<()> {
        let buffer = self.active_mut()?;
        if buffer.writer.is_closed() {
            bail!(ErrorKind::InvalidState, "TSV writer is already closed");
        }

        let row: Vec<&str> = buffer
            .column_names
            .iter()
            .map(|column| fields.get(column).map(String::as_str).unwrap_or(""))
            .collect();
        buffer.writer.write_record(&row);
        buffer.line_count += 1;

        Ok(())
    }

    /// Appends the id of the record written as the latest row.
    pub fn add_record_id(&mut self, record_id: impl Into<String>) -> ExportResult<()> {
        self.active_mut()?.record_ids.push(record_id.into());

        Ok(())
    }

    /// Flushes the destination and closes it for further writes.
    ///
    /// Fails with [`ErrorKind::TsvWriterError`] if the destination reported an error at any point,
    /// in which case the writer stays open and the failure is reported again on the next call.
    pub fn flush_and_close_writer(&mut self) -> ExportResult<()> {
        let buffer = self.active_mut()?;

        if let Some(cause) = buffer.writer.flush() {
            return Err(
                export_error!(ErrorKind::TsvWriterError, "TSV writer has unknown error")
                    .with_shared_source(cause.clone()),
            );
        }

        buffer.writer.close();
        debug!(
            line_count = buffer.line_count,
            file = ?buffer.file,
            "closed tsv writer"
        );

        Ok(())
    }

    /// Path of the destination, absent for failed buffers and buffers not backed by a file.
    pub fn file(&self) -> Option<&Path> {
        match &self.state {
            BufferState::Active(buffer) => buffer.file.as_deref(),
            BufferState::Failed(_) => None,
        }
    }

    /// Number of rows written, excluding the header.
    pub fn line_count(&self) -> usize {
        match &self.state {
            BufferState::Active(buffer) => buffer.line_count,
            BufferState::Failed(_) => 0,
        }
    }

    pub fn record_ids(&self) -> &[String] {
        match &self.state {
            BufferState::Active(buffer) => &buffer.record_ids,
            BufferState::Failed(_) => &[],
        }
    }

    pub fn column_names(&self) -> &[String] {
        match &self.state {
            BufferState::Active(buffer) => &buffer.column_names,
            BufferState::Failed(_) => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, BufferState::Failed(_))
    }

    /// Whether [`TsvInfo::flush_and_close_writer`] completed, so the destination holds every row.
    pub fn is_closed(&self) -> bool {
        match &self.state {
            BufferState::Active(buffer) => buffer.writer.is_closed(),
            BufferState::Failed(_) => false,
        }
    }

    fn active_mut(&mut self) -> ExportResult<&mut ActiveBuffer<W>> {
        match &mut self.state {
            BufferState::Active(buffer) => Ok(buffer),
            BufferState::Failed(cause) => Err(init_error(cause)),
        }
    }
}

fn init_error(cause: &SharedSource) -> ExportError {
    export_error!(
        ErrorKind::TsvInitFailed,
        "TSV buffer failed to initialize",
        cause
    )
    .with_shared_source(cause.clone())
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use super::*;

    /// Writer whose content stays readable after the buffer took ownership of it.
    #[derive(Debug, Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn columns() -> Vec<String> {
        vec!["foo".to_owned(), "bar".to_owned()]
    }

    fn row(fields: &[(&str, &str)]) -> HashMap<String, String> {
        fields
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn writes_header_and_rows_in_column_order() {
        let output = SharedBuffer::default();
        let mut tsv = TsvInfo::new(columns(), None, output.clone());

        tsv.write_row(&row(&[("foo", "foo value"), ("bar", "bar value")]))
            .unwrap();
        tsv.add_record_id("record-1").unwrap();
        tsv.write_row(&row(&[
            ("foo", "second foo value"),
            ("extraneous", "x"),
            ("bar", "second bar value"),
        ]))
        .unwrap();
        tsv.add_record_id("record-2").unwrap();
        tsv.write_row(&row(&[("bar", "has bar but not foo")]))
            .unwrap();
        tsv.add_record_id("record-3").unwrap();
        tsv.flush_and_close_writer().unwrap();

        assert_eq!(
            output.contents(),
            "foo\tbar\n\
             foo value\tbar value\n\
             second foo value\tsecond bar value\n\
             \thas bar but not foo\n"
        );
        assert_eq!(tsv.line_count(), 3);
        assert_eq!(tsv.record_ids(), ["record-1", "record-2", "record-3"]);
        assert_eq!(tsv.column_names(), ["foo", "bar"]);
    }

    #[test]
    fn quotes_values_containing_separators() {
        let output = SharedBuffer::default();
        let mut tsv = TsvInfo::new(columns(), None, output.clone());

        tsv.write_row(&row(&[("foo", "tab\there"), ("bar", "say \"hi\"\nbye")]))
            .unwrap();
        tsv.flush_and_close_writer().unwrap();

        assert_eq!(
            output.contents(),
            "foo\tbar\n\"tab\there\"\t\"say \"\"hi\"\"\nbye\"\n"
        );
    }

    #[test]
    fn single_column_row_with_missing_field_is_an_empty_line() {
        let output = SharedBuffer::default();
        let mut tsv = TsvInfo::new(vec!["foo".to_owned()], None, output.clone());

        tsv.write_row(&row(&[("foo", "first")])).unwrap();
        tsv.write_row(&HashMap::new()).unwrap();
        tsv.write_row(&row(&[("foo", "")])).unwrap();
        tsv.write_row(&row(&[("foo", "last")])).unwrap();
        tsv.flush_and_close_writer().unwrap();

        assert_eq!(output.contents(), "foo\nfirst\n\n\nlast\n");
        assert_eq!(tsv.line_count(), 4);
    }

    #[test]
    fn empty_fields_in_wider_rows_are_not_quoted() {
        let output = SharedBuffer::default();
        let mut tsv = TsvInfo::new(columns(), None, output.clone());

        tsv.write_row(&HashMap::new()).unwrap();
        tsv.flush_and_close_writer().unwrap();

        assert_eq!(output.contents(), "foo\tbar\n\t\n");
    }

    #[test]
    fn writer_error_is_reported_on_flush() {
        let mut tsv = TsvInfo::new(columns(), None, FailingWriter);

        tsv.write_row(&row(&[("foo", "foo value")])).unwrap();
        let err = tsv.flush_and_close_writer().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TsvWriterError);
        assert_eq!(err.description(), "TSV writer has unknown error");
        assert!(err.shared_source().is_some());

        // The writer is not closed silently, the failure is reported again.
        let err = tsv.flush_and_close_writer().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TsvWriterError);
    }

    #[test]
    fn closed_writer_rejects_rows() {
        let mut tsv = TsvInfo::new(columns(), None, SharedBuffer::default());
        tsv.write_row(&row(&[("foo", "value")])).unwrap();
        assert!(!tsv.is_closed());

        tsv.flush_and_close_writer().unwrap();
        assert!(tsv.is_closed());

        let err = tsv.write_row(&row(&[("foo", "late")])).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(tsv.line_count(), 1);
    }

    #[test]
    fn failed_buffer_reraises_the_same_cause() {
        let cause: SharedSource = Arc::new(io::Error::other("could not create file handle"));
        let mut tsv = TsvInfo::<SharedBuffer>::from_init_error(cause.clone());

        let check_err = tsv.check_init().unwrap_err();
        let write_err = tsv.write_row(&row(&[("foo", "value")])).unwrap_err();
        let flush_err = tsv.flush_and_close_writer().unwrap_err();

        for err in [&check_err, &write_err, &flush_err] {
            assert_eq!(err.kind(), ErrorKind::TsvInitFailed);
            assert!(Arc::ptr_eq(err.shared_source().unwrap(), &cause));
        }
        assert_eq!(check_err.detail(), Some("could not create file handle"));

        assert!(tsv.is_failed());
        assert!(!tsv.is_closed());
        assert_eq!(tsv.file(), None);
        assert_eq!(tsv.line_count(), 0);
        assert!(tsv.record_ids().is_empty());
        assert!(tsv.add_record_id("record-1").is_err());
    }

    #[test]
    fn create_writes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.tsv");

        let mut tsv = TsvInfo::create(columns(), &path);
        tsv.write_row(&row(&[("foo", "1"), ("bar", "2")])).unwrap();
        tsv.flush_and_close_writer().unwrap();

        assert_eq!(tsv.file(), Some(path.as_path()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "foo\tbar\n1\t2\n");
    }

    #[test]
    fn create_in_missing_directory_fails_the_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("export.tsv");

        let tsv = TsvInfo::create(columns(), path);

        assert!(tsv.is_failed());
        let err = tsv.check_init().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TsvInitFailed);
        assert!(
            err.shared_source()
                .unwrap()
                .downcast_ref::<io::Error>()
                .is_some()
        );
    }
}
