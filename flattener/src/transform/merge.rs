//! Row merge across layers.
//!
//! Layers are folded from the deepest up. Each shallower layer's rows are
//! crossed with the working list, with the outer row's pairs placed first,
//! so the result of `m` outer and `n` inner rows holds `m × n` rows.

use crate::models::Row;

use super::layer::LayerContainer;

/// Merge the rows of `containers`, ordered by descending level.
pub fn merge_layers(containers: &[LayerContainer]) -> Vec<Row> {
    merge_rows(containers.iter().map(|c| (c.level(), c.rows())))
}

/// Merge `(level, rows)` pairs.
///
/// The sort is stable, so layers of equal depth keep their given order.
pub fn merge_rows<'a>(layers: impl IntoIterator<Item = (usize, &'a [Row])>) -> Vec<Row> {
    let mut layers: Vec<(usize, &[Row])> = layers.into_iter().collect();
    layers.sort_by(|a, b| b.0.cmp(&a.0));

    let mut iter = layers.into_iter();
    let mut working: Vec<Row> = match iter.next() {
        Some((_, rows)) => rows.to_vec(),
        None => return Vec::new(),
    };

    for (_, outer) in iter {
        let mut next = Vec::with_capacity(outer.len() * working.len());
        for v in outer {
            for w in &working {
                next.push(w.prepend(v));
            }
        }
        working = next;
    }
    working
}
