//! Test doubles for exercising the exporter without a remote table service.
//!
//! [`table_service::ScriptedTableService`] keeps tables, columns and files in memory, records every
//! call and replays failures queued by the test.

pub mod table_service;
