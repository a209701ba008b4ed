//! Structured warehouse statements.
//!
//! Operators never splice table names or credentials into SQL text. They
//! hand a [`Statement`] to the [`WarehouseClient`](crate::WarehouseClient),
//! which is responsible for rendering it safely for its backend.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::collaborators::AwsCredentials;

/// One result row; columns are positional.
pub type Row = Vec<serde_json::Value>;

/// Format descriptor for a bulk copy of JSON data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CopyFormat {
    /// Let the warehouse map JSON keys onto columns by name.
    #[default]
    Auto,
    /// Location of a JSONPaths file describing the column mapping.
    JsonPaths(String),
}

impl From<String> for CopyFormat {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("auto") {
            CopyFormat::Auto
        } else {
            CopyFormat::JsonPaths(value)
        }
    }
}

impl From<CopyFormat> for String {
    fn from(value: CopyFormat) -> Self {
        match value {
            CopyFormat::Auto => "auto".to_string(),
            CopyFormat::JsonPaths(path) => path,
        }
    }
}

/// A single operation against the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Opaque SQL supplied by configuration (schema creation).
    Raw(String),
    /// Delete every row of `table` (transactional, unlike truncate).
    Clear { table: String },
    /// Truncate `table`.
    Truncate { table: String },
    /// Bulk-load `table` from an object-storage location.
    Copy {
        table: String,
        source: String,
        credentials: AwsCredentials,
        format: CopyFormat,
        region: String,
    },
    /// `INSERT INTO table <select_sql>`.
    InsertSelect { table: String, select_sql: String },
    /// `SELECT COUNT(*) FROM table`.
    CountRows { table: String },
}

impl Statement {
    /// Short upper-case verb, used in logs and by test doubles.
    pub fn verb(&self) -> &'static str {
        match self {
            Statement::Raw(_) => "RAW",
            Statement::Clear { .. } => "DELETE",
            Statement::Truncate { .. } => "TRUNCATE",
            Statement::Copy { .. } => "COPY",
            Statement::InsertSelect { .. } => "INSERT",
            Statement::CountRows { .. } => "COUNT",
        }
    }

    /// The table the statement operates on, if it names one.
    pub fn table(&self) -> Option<&str> {
        match self {
            Statement::Raw(_) => None,
            Statement::Clear { table }
            | Statement::Truncate { table }
            | Statement::Copy { table, .. }
            | Statement::InsertSelect { table, .. }
            | Statement::CountRows { table } => Some(table),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.table() {
            Some(table) => write!(f, "{} {}", self.verb(), table),
            None => f.write_str(self.verb()),
        }
    }
}
