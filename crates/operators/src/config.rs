//! Kind-specific task configuration.
//!
//! Configuration arrives as free-form JSON (from a pipeline definition) and
//! is checked against the declared [`OperatorKind`] by [`TaskConfig::parse`].
//! Once parsed, a `TaskConfig` is known to be usable; operators never
//! re-validate it.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::InvalidConfig, statement::CopyFormat};

// ---------------------------------------------------------------------------
// OperatorKind
// ---------------------------------------------------------------------------

/// The behaviour a task node carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Noop,
    Sql,
    Stage,
    LoadFact,
    LoadDimension,
    DataQuality,
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Noop => write!(f, "noop"),
            Self::Sql => write!(f, "sql"),
            Self::Stage => write!(f, "stage"),
            Self::LoadFact => write!(f, "load_fact"),
            Self::LoadDimension => write!(f, "load_dimension"),
            Self::DataQuality => write!(f, "data_quality"),
        }
    }
}

impl FromStr for OperatorKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "noop"           => Ok(Self::Noop),
            "sql"            => Ok(Self::Sql),
            "stage"          => Ok(Self::Stage),
            "load_fact"      => Ok(Self::LoadFact),
            "load_dimension" => Ok(Self::LoadDimension),
            "data_quality"   => Ok(Self::DataQuality),
            other            => Err(format!("unknown operator kind: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-kind configuration
// ---------------------------------------------------------------------------

/// Statements run verbatim, in order (schema creation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqlConfig {
    pub statements: Vec<String>,
}

/// Copy from object storage into a staging table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// Destination staging table.
    pub table: String,
    /// Source location, e.g. `s3://udacity-dend/log_data`.
    pub source: String,
    #[serde(default = "default_credentials_id")]
    pub credentials_id: String,
    #[serde(default)]
    pub format: CopyFormat,
    #[serde(default = "default_region")]
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadFactConfig {
    pub table: String,
    pub select_sql: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadDimensionConfig {
    pub table: String,
    pub select_sql: String,
    /// Empty the table before inserting (full reload instead of append).
    pub truncate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataQualityConfig {
    pub tables: Vec<String>,
    pub expected_min_rows: i64,
}

fn default_credentials_id() -> String {
    "aws_credentials".to_string()
}

fn default_region() -> String {
    "us-west-2".to_string()
}

// ---------------------------------------------------------------------------
// TaskConfig
// ---------------------------------------------------------------------------

/// Validated configuration, one variant per [`OperatorKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "config", rename_all = "snake_case")]
pub enum TaskConfig {
    Noop,
    Sql(SqlConfig),
    Stage(StageConfig),
    LoadFact(LoadFactConfig),
    LoadDimension(LoadDimensionConfig),
    DataQuality(DataQualityConfig),
}

impl TaskConfig {
    /// Parse and check `config` for a task of the given kind.
    ///
    /// # Errors
    /// [`InvalidConfig`] when a field is missing, empty, of the wrong type,
    /// or not recognised for the kind.
    pub fn parse(kind: OperatorKind, config: Value) -> Result<Self, InvalidConfig> {
        let parsed = match kind {
            OperatorKind::Noop => match &config {
                Value::Null => TaskConfig::Noop,
                Value::Object(map) if map.is_empty() => TaskConfig::Noop,
                _ => return Err(InvalidConfig("noop tasks take no configuration".into())),
            },
            OperatorKind::Sql => {
                let c: SqlConfig = from_value(kind, config)?;
                if c.statements.is_empty() {
                    return Err(InvalidConfig("sql: 'statements' must not be empty".into()));
                }
                for (i, stmt) in c.statements.iter().enumerate() {
                    require(kind, &format!("statements[{i}]"), stmt)?;
                }
                TaskConfig::Sql(c)
            }
            OperatorKind::Stage => {
                let c: StageConfig = from_value(kind, config)?;
                require(kind, "table", &c.table)?;
                require(kind, "source", &c.source)?;
                require(kind, "credentials_id", &c.credentials_id)?;
                require(kind, "region", &c.region)?;
                if let CopyFormat::JsonPaths(path) = &c.format {
                    require(kind, "format", path)?;
                }
                TaskConfig::Stage(c)
            }
            OperatorKind::LoadFact => {
                let c: LoadFactConfig = from_value(kind, config)?;
                require(kind, "table", &c.table)?;
                require(kind, "select_sql", &c.select_sql)?;
                TaskConfig::LoadFact(c)
            }
            OperatorKind::LoadDimension => {
                let c: LoadDimensionConfig = from_value(kind, config)?;
                require(kind, "table", &c.table)?;
                require(kind, "select_sql", &c.select_sql)?;
                TaskConfig::LoadDimension(c)
            }
            OperatorKind::DataQuality => {
                let c: DataQualityConfig = from_value(kind, config)?;
                if c.tables.is_empty() {
                    return Err(InvalidConfig("data_quality: 'tables' must not be empty".into()));
                }
                for (i, table) in c.tables.iter().enumerate() {
                    require(kind, &format!("tables[{i}]"), table)?;
                }
                if c.expected_min_rows < 0 {
                    return Err(InvalidConfig(format!(
                        "data_quality: 'expected_min_rows' must be >= 0, got {}",
                        c.expected_min_rows
                    )));
                }
                TaskConfig::DataQuality(c)
            }
        };
        Ok(parsed)
    }

    pub fn kind(&self) -> OperatorKind {
        match self {
            TaskConfig::Noop => OperatorKind::Noop,
            TaskConfig::Sql(_) => OperatorKind::Sql,
            TaskConfig::Stage(_) => OperatorKind::Stage,
            TaskConfig::LoadFact(_) => OperatorKind::LoadFact,
            TaskConfig::LoadDimension(_) => OperatorKind::LoadDimension,
            TaskConfig::DataQuality(_) => OperatorKind::DataQuality,
        }
    }
}

fn from_value<T: DeserializeOwned>(kind: OperatorKind, config: Value) -> Result<T, InvalidConfig> {
    serde_json::from_value(config).map_err(|e| InvalidConfig(format!("{kind}: {e}")))
}

fn require(kind: OperatorKind, field: &str, value: &str) -> Result<(), InvalidConfig> {
    if value.trim().is_empty() {
        return Err(InvalidConfig(format!("{kind}: '{field}' must not be empty")));
    }
    Ok(())
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stage_fills_in_defaults() {
        let cfg = TaskConfig::parse(
            OperatorKind::Stage,
            json!({ "table": "staging_songs", "source": "s3://udacity-dend/song_data" }),
        )
        .expect("valid stage config");

        match cfg {
            TaskConfig::Stage(c) => {
                assert_eq!(c.credentials_id, "aws_credentials");
                assert_eq!(c.format, CopyFormat::Auto);
                assert_eq!(c.region, "us-west-2");
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn stage_without_source_is_rejected() {
        let err = TaskConfig::parse(OperatorKind::Stage, json!({ "table": "staging_events" }))
            .unwrap_err();
        assert!(err.0.contains("source"), "{err}");
    }

    #[test]
    fn load_dimension_requires_truncate_flag() {
        let err = TaskConfig::parse(
            OperatorKind::LoadDimension,
            json!({ "table": "users", "select_sql": "SELECT 1" }),
        )
        .unwrap_err();
        assert!(err.0.contains("truncate"), "{err}");
    }

    #[test]
    fn empty_table_name_is_rejected() {
        let err = TaskConfig::parse(
            OperatorKind::LoadFact,
            json!({ "table": "  ", "select_sql": "SELECT 1" }),
        )
        .unwrap_err();
        assert_eq!(err.0, "load_fact: 'table' must not be empty");
    }

    #[test]
    fn data_quality_needs_tables_and_non_negative_minimum() {
        assert!(TaskConfig::parse(
            OperatorKind::DataQuality,
            json!({ "tables": [], "expected_min_rows": 1 })
        )
        .is_err());
        assert!(TaskConfig::parse(
            OperatorKind::DataQuality,
            json!({ "tables": ["users"], "expected_min_rows": -1 })
        )
        .is_err());
        assert!(TaskConfig::parse(
            OperatorKind::DataQuality,
            json!({ "tables": ["users"] })
        )
        .is_err());
    }

    #[test]
    fn config_of_another_kind_is_a_mismatch() {
        // A stage config handed to a load_fact task.
        let err = TaskConfig::parse(
            OperatorKind::LoadFact,
            json!({ "table": "songplays", "source": "s3://bucket/key" }),
        )
        .unwrap_err();
        assert!(err.0.starts_with("load_fact:"), "{err}");
    }

    #[test]
    fn noop_rejects_configuration() {
        assert_eq!(TaskConfig::parse(OperatorKind::Noop, Value::Null), Ok(TaskConfig::Noop));
        assert_eq!(TaskConfig::parse(OperatorKind::Noop, json!({})), Ok(TaskConfig::Noop));
        assert!(TaskConfig::parse(OperatorKind::Noop, json!({ "table": "x" })).is_err());
    }

    #[test]
    fn kind_round_trips_through_its_name() {
        for kind in [
            OperatorKind::Noop,
            OperatorKind::Sql,
            OperatorKind::Stage,
            OperatorKind::LoadFact,
            OperatorKind::LoadDimension,
            OperatorKind::DataQuality,
        ] {
            assert_eq!(kind.to_string().parse::<OperatorKind>(), Ok(kind));
        }
    }
}
