//! Error types and result definitions for export operations.
//!
//! [`ExportError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, an optional source error, and the location where it was raised. Several errors
//! can be aggregated into one, which is how a batch of independent failures is reported.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use config::shared::ValidationError;

/// Convenient result type for export operations using [`ExportError`] as the error type.
pub type ExportResult<T> = Result<T, ExportError>;

/// Shared handle to the error that caused an [`ExportError`].
pub type SharedSource = Arc<dyn error::Error + Send + Sync>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<SharedSource>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for export operations.
#[derive(Debug, Clone)]
pub struct ExportError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Multiple aggregated errors, for example the failed columns of one schema comparison.
    Many {
        errors: Vec<ExportError>,
        location: &'static Location<'static>,
    },
}

/// Categories of errors that can occur while exporting records to the remote table service.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Schema Errors
    SchemaError,

    // Remote Service Errors
    RemoteServiceUnavailable,
    RemoteRateLimited,
    RemoteConflict,
    RemoteInvalidRequest,
    RemoteNotFound,
    RemotePermissionDenied,
    RemoteServiceError,
    RemoteServiceReadOnly,
    RemoteRetriesExhausted,

    // Async Job Errors
    RemoteJobTimeout,
    RemoteJobFailed,

    // Tabular Buffer Errors
    TsvWriterError,
    TsvInitFailed,

    // State & IO Errors
    InvalidState,
    IoError,
    ConfigError,

    Unknown,
}

impl ExportError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For aggregated errors, returns the kind of the first error or [`ErrorKind::Unknown`] if the
    /// list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors.iter().flat_map(|err| err.kinds()).collect(),
        }
    }

    /// Returns the static description of this error.
    ///
    /// For aggregated errors, returns the description of the first error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => &payload.description,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.description())
                .unwrap_or("multiple errors"),
        }
    }

    /// Returns the dynamic detail of this error, if any.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the callsite where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Returns the shared source of this error, if any.
    pub fn shared_source(&self) -> Option<&SharedSource> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.source.as_ref(),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Attaches an originating error to this error and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward their first error as source.
    pub fn with_source<E>(self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.with_shared_source(Arc::new(source))
    }

    /// Attaches an already shared source, so several errors can point at the same cause.
    pub fn with_shared_source(mut self, source: SharedSource) -> Self {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(source);
        }

        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<SharedSource>,
    ) -> Self {
        ExportError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for ExportError {
    fn eq(&self, other: &ExportError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, "\n  Detail:")?;
                    for line in detail.lines() {
                        write!(f, "\n    {line}")?;
                    }
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    if let Some(first_line) = lines.next() {
                        write!(f, "\n  {}. {}", index + 1, first_line)?;
                    }
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for ExportError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

/// Creates an [`ExportError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for ExportError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> ExportError {
        ExportError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`ExportError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for ExportError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> ExportError {
        ExportError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates a vector of errors. A single error is returned unwrapped.
impl<E> From<Vec<E>> for ExportError
where
    E: Into<ExportError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> ExportError {
        let location = Location::caller();
        let mut errors: Vec<ExportError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        ExportError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for ExportError {
    #[track_caller]
    fn from(err: std::io::Error) -> ExportError {
        let detail = err.to_string();
        ExportError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<ValidationError> for ExportError {
    #[track_caller]
    fn from(err: ValidationError) -> ExportError {
        let detail = err.to_string();
        ExportError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid exporter configuration"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::{bail, export_error};

    fn fails_with_schema_error() -> ExportResult<()> {
        bail!(
            ErrorKind::SchemaError,
            "Column has no max length",
            "old column foo has type STRING and no max length"
        );
    }

    #[test]
    fn bail_returns_error_with_detail() {
        let err = fails_with_schema_error().unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SchemaError);
        assert_eq!(err.description(), "Column has no max length");
        assert_eq!(
            err.detail(),
            Some("old column foo has type STRING and no max length")
        );
        assert!(err.to_string().contains("[SchemaError] Column has no max length"));
    }

    fn fails_with_io_source(path: &str) -> ExportResult<()> {
        bail!(
            ErrorKind::IoError,
            "Could not read TSV file",
            detail = format!("path {path}"),
            source: std::io::Error::other("permission denied")
        );
    }

    #[test]
    fn bail_returns_error_with_owned_detail_and_source() {
        let err = fails_with_io_source("/tmp/export.tsv").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IoError);
        assert_eq!(err.detail(), Some("path /tmp/export.tsv"));
        assert_eq!(err.source().unwrap().to_string(), "permission denied");
    }

    #[test]
    fn shared_source_is_preserved_across_errors() {
        let cause: SharedSource = Arc::new(std::io::Error::other("disk full"));

        let first = export_error!(ErrorKind::TsvInitFailed, "first").with_shared_source(cause.clone());
        let second = export_error!(ErrorKind::TsvInitFailed, "second").with_shared_source(cause.clone());

        assert!(Arc::ptr_eq(first.shared_source().unwrap(), &cause));
        assert!(Arc::ptr_eq(second.shared_source().unwrap(), &cause));
        assert_eq!(first.source().unwrap().to_string(), "disk full");
    }

    #[test]
    fn aggregation_flattens_kinds_and_unwraps_single_errors() {
        let single: ExportError = vec![export_error!(ErrorKind::IoError, "io")].into();
        assert_eq!(single.kind(), ErrorKind::IoError);
        assert!(single.backtrace().is_some());

        let many: ExportError = vec![
            export_error!(ErrorKind::SchemaError, "a"),
            export_error!(ErrorKind::RemoteConflict, "b"),
        ]
        .into();

        assert_eq!(many.kind(), ErrorKind::SchemaError);
        assert_eq!(
            many.kinds(),
            vec![ErrorKind::SchemaError, ErrorKind::RemoteConflict]
        );
        assert!(many.to_string().starts_with("[Many] 2 errors aggregated"));
    }

    #[test]
    fn io_errors_map_to_io_kind() {
        let err: ExportError = std::io::Error::other("boom").into();

        assert_eq!(err.kind(), ErrorKind::IoError);
        assert_eq!(err.detail(), Some("boom"));
    }
}
