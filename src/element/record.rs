use super::column::Column;
use std::fmt;

/// Fixed per-record overhead counted toward a record's memory size
pub const RECORD_HEAD_BYTES: usize = 80;
/// Fixed per-column overhead counted toward a record's memory size
pub const COLUMN_HEAD_BYTES: usize = 24;

/// An ordered row of columns with running size accounting
///
/// `byte_size` is the payload size (sum of column byte sizes) and is what the
/// throughput statistics count. `memory_size` adds the record and column
/// overheads and is what the exchanger's batching and the channel's byte
/// capacity are measured against.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Vec<Column>,
    byte_size: usize,
    memory_size: usize,
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl Record {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            byte_size: 0,
            memory_size: RECORD_HEAD_BYTES,
        }
    }

    pub fn with_capacity(columns: usize) -> Self {
        Self {
            columns: Vec::with_capacity(columns),
            byte_size: 0,
            memory_size: RECORD_HEAD_BYTES,
        }
    }

    pub fn from_columns(columns: impl IntoIterator<Item = Column>) -> Self {
        let mut record = Self::new();
        for column in columns {
            record.add_column(column);
        }
        record
    }

    pub fn add_column(&mut self, column: Column) {
        self.account_added(&column);
        self.columns.push(column);
    }

    /// Replace the column at `index`, padding with nulls if the row is shorter
    pub fn set_column(&mut self, index: usize, column: Column) {
        while self.columns.len() <= index {
            self.add_column(Column::Null);
        }
        let previous = std::mem::replace(&mut self.columns[index], Column::Null);
        self.account_removed(&previous);
        self.account_added(&column);
        self.columns[index] = column;
    }

    pub fn get_column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn column_number(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub fn memory_size(&self) -> usize {
        self.memory_size
    }

    fn account_added(&mut self, column: &Column) {
        self.byte_size += column.byte_size();
        self.memory_size += COLUMN_HEAD_BYTES + column.byte_size();
    }

    fn account_removed(&mut self, column: &Column) {
        self.byte_size -= column.byte_size();
        self.memory_size -= COLUMN_HEAD_BYTES + column.byte_size();
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{column}")?;
        }
        Ok(())
    }
}
