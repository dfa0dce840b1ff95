use crate::error::{Result, SyncError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column type tags as they appear in job documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Null,
    String,
    Long,
    Double,
    Bool,
    Date,
    Timestamp,
    Bytes,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::String => write!(f, "string"),
            Self::Long => write!(f, "long"),
            Self::Double => write!(f, "double"),
            Self::Bool => write!(f, "bool"),
            Self::Date => write!(f, "date"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::Bytes => write!(f, "bytes"),
        }
    }
}

impl std::str::FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Ok(Self::Null),
            "string" => Ok(Self::String),
            "long" | "int" | "integer" => Ok(Self::Long),
            "double" | "float" => Ok(Self::Double),
            "bool" | "boolean" => Ok(Self::Bool),
            "date" => Ok(Self::Date),
            "timestamp" | "datetime" => Ok(Self::Timestamp),
            "bytes" => Ok(Self::Bytes),
            _ => Err(format!("Unknown column type: {s}")),
        }
    }
}

/// A single typed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Column {
    Null,
    String(String),
    Long(i64),
    Double(f64),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl Column {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::Null => ColumnType::Null,
            Self::String(_) => ColumnType::String,
            Self::Long(_) => ColumnType::Long,
            Self::Double(_) => ColumnType::Double,
            Self::Bool(_) => ColumnType::Bool,
            Self::Date(_) => ColumnType::Date,
            Self::Timestamp(_) => ColumnType::Timestamp,
            Self::Bytes(_) => ColumnType::Bytes,
        }
    }

    /// Payload size used for channel byte accounting
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::String(s) => s.len(),
            Self::Long(_) | Self::Double(_) | Self::Date(_) | Self::Timestamp(_) => 8,
            Self::Bool(_) => 1,
            Self::Bytes(b) => b.len(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text rendering; `None` for null
    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::String(s) => Some(s.clone()),
            Self::Long(v) => Some(v.to_string()),
            Self::Double(v) => Some(v.to_string()),
            Self::Bool(v) => Some(v.to_string()),
            Self::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Self::Timestamp(t) => Some(t.format("%Y-%m-%d %H:%M:%S").to_string()),
            Self::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }

    pub fn as_long(&self) -> Result<Option<i64>> {
        match self {
            Self::Null => Ok(None),
            Self::Long(v) => Ok(Some(*v)),
            Self::Double(v) if v.fract() == 0.0 && v.is_finite() => Ok(Some(*v as i64)),
            Self::Bool(v) => Ok(Some(i64::from(*v))),
            Self::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| self.conversion_error(ColumnType::Long)),
            Self::Timestamp(t) => Ok(Some(t.timestamp_millis())),
            _ => Err(self.conversion_error(ColumnType::Long)),
        }
    }

    pub fn as_double(&self) -> Result<Option<f64>> {
        match self {
            Self::Null => Ok(None),
            Self::Double(v) => Ok(Some(*v)),
            Self::Long(v) => Ok(Some(*v as f64)),
            Self::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.conversion_error(ColumnType::Double)),
            _ => Err(self.conversion_error(ColumnType::Double)),
        }
    }

    pub fn as_bool(&self) -> Result<Option<bool>> {
        match self {
            Self::Null => Ok(None),
            Self::Bool(v) => Ok(Some(*v)),
            Self::Long(v) => Ok(Some(*v != 0)),
            Self::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(self.conversion_error(ColumnType::Bool)),
            },
            _ => Err(self.conversion_error(ColumnType::Bool)),
        }
    }

    /// Build a column from a type tag and its textual value
    pub fn parse(column_type: ColumnType, raw: Option<&str>) -> Result<Column> {
        let Some(raw) = raw else {
            return Ok(Column::Null);
        };
        let source = Column::String(raw.to_string());
        let column = match column_type {
            ColumnType::Null => Column::Null,
            ColumnType::String => source,
            ColumnType::Long => source.as_long()?.map_or(Column::Null, Column::Long),
            ColumnType::Double => source.as_double()?.map_or(Column::Null, Column::Double),
            ColumnType::Bool => source.as_bool()?.map_or(Column::Null, Column::Bool),
            ColumnType::Date => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map(Column::Date)
                .map_err(|_| source.conversion_error(ColumnType::Date))?,
            ColumnType::Timestamp => DateTime::parse_from_rfc3339(raw.trim())
                .map(|t| Column::Timestamp(t.with_timezone(&Utc)))
                .or_else(|_| {
                    chrono::NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S")
                        .map(|t| Column::Timestamp(t.and_utc()))
                })
                .map_err(|_| source.conversion_error(ColumnType::Timestamp))?,
            ColumnType::Bytes => Column::Bytes(raw.as_bytes().to_vec()),
        };
        Ok(column)
    }

    fn conversion_error(&self, to: ColumnType) -> SyncError {
        SyncError::ColumnConversion {
            from: self.column_type().to_string(),
            to: to.to_string(),
            value: self.as_string().unwrap_or_else(|| "null".to_string()),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_string() {
            Some(text) => write!(f, "{text}"),
            None => write!(f, "null"),
        }
    }
}

impl From<&str> for Column {
    fn from(value: &str) -> Self {
        Column::String(value.to_string())
    }
}

impl From<String> for Column {
    fn from(value: String) -> Self {
        Column::String(value)
    }
}

impl From<i64> for Column {
    fn from(value: i64) -> Self {
        Column::Long(value)
    }
}

impl From<f64> for Column {
    fn from(value: f64) -> Self {
        Column::Double(value)
    }
}

impl From<bool> for Column {
    fn from(value: bool) -> Self {
        Column::Bool(value)
    }
}
