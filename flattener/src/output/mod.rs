//! CSV output.
//!
//! A [`CsvSink`] owns one table's writer and its fixed column order. Rows
//! are written by looking up each column in turn; a row that lacks a column
//! gets an empty field.

use csv::{Writer, WriterBuilder};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::error::RunResult;
use crate::models::{Column, Row};

pub struct CsvSink<W: Write> {
    writer: Writer<W>,
    columns: Vec<Arc<Column>>,
    rows_written: u64,
}

impl CsvSink<File> {
    /// Create `path` (and its parent directories) and write the header.
    pub fn create(path: &Path, columns: Vec<Arc<Column>>) -> RunResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Self::from_writer(file, columns)
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(inner: W, columns: Vec<Arc<Column>>) -> RunResult<Self> {
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(inner);
        writer.write_record(columns.iter().map(|c| c.name()))?;
        Ok(Self {
            writer,
            columns,
            rows_written: 0,
        })
    }

    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    pub fn write_rows(&mut self, rows: &[Row]) -> RunResult<usize> {
        for row in rows {
            self.writer.write_record(row.project(&self.columns))?;
        }
        self.rows_written += rows.len() as u64;
        Ok(rows.len())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn flush(&mut self) -> RunResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> RunResult<W> {
        self.writer.into_inner().map_err(|e| e.into_error().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn col(name: &str, seq: usize) -> Arc<Column> {
        Arc::new(Column::new(name, SourceKind::Literal, "", 0, None, seq).unwrap())
    }

    #[test]
    fn test_rows_follow_header_order() {
        let a = col("a", 0);
        let b = col("b, quoted", 1);
        let c = col("c", 2);
        let mut sink =
            CsvSink::from_writer(Vec::new(), vec![a.clone(), b.clone(), c.clone()]).unwrap();

        // Row columns in a different order, and without `c`
        let row = Row::new(vec![b.clone(), a.clone()], vec!["2".into(), "1".into()]).unwrap();
        assert_eq!(sink.write_rows(&[row]).unwrap(), 1);
        assert_eq!(sink.rows_written(), 1);

        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(out, "a,\"b, quoted\",c\n1,2,\n");
    }

    #[test]
    fn test_create_makes_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.csv");
        let mut sink = CsvSink::create(&path, vec![col("x", 0)]).unwrap();
        sink.flush().unwrap();
        drop(sink);
        assert_eq!(fs::read_to_string(&path).unwrap(), "x\n");
    }
}
