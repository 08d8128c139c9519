//! Flattened rows.

use std::sync::Arc;
use thiserror::Error;

use super::column::Column;

/// Raised when a row is built from sequences of different lengths.
#[derive(Debug, Error, PartialEq)]
#[error("Row has {columns} columns but {values} values")]
pub struct RowShapeError {
    pub columns: usize,
    pub values: usize,
}

/// An immutable row: columns and values paired by position.
///
/// Rows from different layers carry disjoint column sets, so combining two
/// rows is plain concatenation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<Arc<Column>>,
    values: Vec<String>,
}

impl Row {
    pub fn new(columns: Vec<Arc<Column>>, values: Vec<String>) -> Result<Self, RowShapeError> {
        if columns.len() != values.len() {
            return Err(RowShapeError {
                columns: columns.len(),
                values: values.len(),
            });
        }
        Ok(Self { columns, values })
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Arc<Column>, String)>) -> Self {
        let (columns, values) = pairs.into_iter().unzip();
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Value for `column`, or `""` when the row does not carry it.
    pub fn get(&self, column: &Column) -> &str {
        self.columns
            .iter()
            .position(|c| std::ptr::eq(c.as_ref(), column) || c.as_ref() == column)
            .map(|i| self.values[i].as_str())
            .unwrap_or("")
    }

    /// A new row holding `outer`'s pairs followed by this row's.
    pub fn prepend(&self, outer: &Row) -> Row {
        let mut columns = Vec::with_capacity(outer.len() + self.len());
        columns.extend(outer.columns.iter().cloned());
        columns.extend(self.columns.iter().cloned());
        let mut values = Vec::with_capacity(outer.len() + self.len());
        values.extend(outer.values.iter().cloned());
        values.extend(self.values.iter().cloned());
        Row { columns, values }
    }

    /// Values laid out in `order`, blank where the row has no value.
    pub fn project<'a>(&'a self, order: &'a [Arc<Column>]) -> impl Iterator<Item = &'a str> + 'a {
        order.iter().map(move |c| self.get(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    fn col(name: &str, seq: usize) -> Arc<Column> {
        Arc::new(Column::new(name, SourceKind::Literal, name, 0, None, seq).unwrap())
    }

    #[test]
    fn test_shape_is_checked() {
        let err = Row::new(vec![col("a", 0)], vec![]).unwrap_err();
        assert_eq!(err, RowShapeError { columns: 1, values: 0 });
    }

    #[test]
    fn test_lookup_defaults_to_empty() {
        let a = col("a", 0);
        let b = col("b", 1);
        let row = Row::new(vec![a.clone()], vec!["1".into()]).unwrap();
        assert_eq!(row.get(&a), "1");
        assert_eq!(row.get(&b), "");
        // Equal by identity even through a different allocation
        assert_eq!(row.get(&col("a", 0)), "1");
    }

    #[test]
    fn test_prepend_keeps_pairs_aligned() {
        let a = col("a", 0);
        let b = col("b", 1);
        let inner = Row::new(vec![b.clone()], vec!["inner".into()]).unwrap();
        let outer = Row::new(vec![a.clone()], vec!["outer".into()]).unwrap();
        let merged = inner.prepend(&outer);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.columns().len(), merged.values().len());
        assert_eq!(merged.values(), &["outer".to_string(), "inner".to_string()]);
        assert_eq!(merged.get(&b), "inner");
        assert_eq!(inner.len(), 1);

        let order = vec![b.clone(), a.clone()];
        let projected: Vec<&str> = merged.project(&order).collect();
        assert_eq!(projected, vec!["inner", "outer"]);
    }
}
