//! Drops rows without a photo key and collapses rows sharing one.
use crate::schema::ColumnMapping;
use crate::schema::SchemaError;
use crate::schema::KEY_FIELD;
use crate::table::Table;
use crate::table::Value;
use log::debug;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RemovalStats {
    pub rows_before: usize,
    pub rows_after: usize,
    pub missing_key_removed: usize,
    pub duplicate_removed: usize,
    pub total_removed: usize,
}

/// The comparison form of a photo key: its display string, trimmed.
pub fn key_of(value: &Value) -> String {
    value.to_string().trim().to_owned()
}

/// Drops rows without a photo key and collapses rows sharing a key
///
/// Within a group of rows sharing a key, the row with the most non-empty
/// fields (over all columns) survives; the first one wins a tie. Keys are
/// compared after trimming.
///
/// # Arguments
/// * `table` - The table as read
/// * `mapping` - Locates the key column
///
/// # Returns
/// The surviving rows in their original order, and the removal counts
pub fn clean(table: &Table, mapping: &ColumnMapping) -> Result<(Table, RemovalStats), SchemaError> {
    let key_index = mapping.index_of(KEY_FIELD)?;
    let rows = table.rows();

    let keyed: Vec<(usize, String)> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| (index, key_of(row.get(key_index))))
        .filter(|(_, key)| !key.is_empty())
        .collect();
    let missing_key_removed = rows.len() - keyed.len();

    // Key → index of the best row so far.
    let mut survivors = HashMap::<&str, usize>::new();
    for (index, key) in &keyed {
        survivors
            .entry(key.as_str())
            .and_modify(|best| {
                if rows[*index].non_empty_count() > rows[*best].non_empty_count() {
                    *best = *index;
                }
            })
            .or_insert(*index);
    }
    let mut kept: Vec<usize> = survivors.into_values().collect();
    kept.sort_unstable();
    let duplicate_removed = keyed.len() - kept.len();
    if duplicate_removed > 0 {
        debug!("Collapsed {} rows with duplicate {}", duplicate_removed, KEY_FIELD);
    }

    let cleaned = table.select(&kept);
    let stats = RemovalStats {
        rows_before: rows.len(),
        rows_after: cleaned.len(),
        missing_key_removed,
        duplicate_removed,
        total_removed: missing_key_removed + duplicate_removed,
    };
    Ok((cleaned, stats))
}
