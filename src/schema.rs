//! Maps the required catalog fields onto the headers actually present in a table.
use crate::config::SchemaConfig;
use log::debug;
use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub const KEY_FIELD: &str = "FOTO";
pub const DETAIL_PHOTO_FIELD: &str = "FOTO DETTAGLIO";
pub const HEIGHT_FIELD: &str = "ALTEZZA";
pub const WEIGHT_FIELD: &str = "PESO";

/// Logical fields every catalog table must supply, in output order.
pub const REQUIRED_FIELDS: [&str; 17] = [
    "CODICE TAILOR",
    KEY_FIELD,
    DETAIL_PHOTO_FIELD,
    "POSIZIONE",
    "CATEGORIA",
    "COMPOSIZIONE",
    "FORNITORE",
    "ART. FORNITORE",
    "UNITA' DI MISURA",
    HEIGHT_FIELD,
    WEIGHT_FIELD,
    "ARMATURA",
    "LAVORAZIONE",
    "DESCRIZIONE",
    "MOTIVO",
    "SOSTENIBILITA'",
    "CERTIFICAZIONE",
];

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingFieldsError(Vec<String>),

    #[error("Ambiguous columns: {}", .0.join("; "))]
    AmbiguousColumns(Vec<String>),

    #[error("Column '{0}' is not mapped")]
    UnmappedFieldError(String),
}

/// How a field found its header.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    CaseInsensitive,
    Normalized,
    /// Normalized containment, with the length ratio of the two names.
    Fuzzy(f64),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MappedField {
    pub field: String,
    pub header: String,
    pub index: usize,
    pub strategy: MatchStrategy,
}

/// One header per required field, in required-field order.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ColumnMapping {
    fields: Vec<MappedField>,
}

impl ColumnMapping {
    pub fn fields(&self) -> &[MappedField] {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&MappedField> {
        self.fields.iter().find(|mapped| mapped.field == field)
    }

    /// Column index of `field` in the source table.
    pub fn index_of(&self, field: &str) -> Result<usize, SchemaError> {
        self.get(field)
            .map(|mapped| mapped.index)
            .ok_or_else(|| SchemaError::UnmappedFieldError(field.to_owned()))
    }

    pub fn header_of(&self, field: &str) -> Option<&str> {
        self.get(field).map(|mapped| mapped.header.as_str())
    }

    /// Headers claimed by more than one field, with the fields claiming them.
    pub fn collisions(&self) -> Vec<(String, Vec<String>)> {
        let mut claims = BTreeMap::<usize, Vec<&MappedField>>::new();
        for mapped in &self.fields {
            claims.entry(mapped.index).or_default().push(mapped);
        }
        claims
            .into_values()
            .filter(|fields| fields.len() > 1)
            .map(|fields| {
                let header = fields[0].header.clone();
                (header, fields.into_iter().map(|mapped| mapped.field.clone()).collect())
            })
            .collect()
    }
}

/// Lower-cases and keeps only `[a-z0-9]`: `"Art. Fornitore"` → `"artfornitore"`.
pub fn normalize_header(header: &str) -> String {
    header
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// [`reconcile_with`] under the default configuration: 0.70 fuzzy threshold,
/// shared columns allowed.
pub fn reconcile<S: AsRef<str>>(headers: &[S], required: &[&str]) -> Result<ColumnMapping, SchemaError> {
    reconcile_with(headers, required, &SchemaConfig::default())
}

/// Maps each required field onto one of the table's headers
///
/// Every field is matched on its own, trying in turn an exact match, a
/// case-insensitive match, a match on the normalized header and finally the
/// best containment ratio between normalized names. Two fields may land on the
/// same header unless `strict_columns` is set.
///
/// # Arguments
/// * `headers` - The table's column names, in table order
/// * `required` - Field names to map
/// * `config` - Fuzzy threshold and collision policy
///
/// # Returns
/// The mapping, one entry per required field in `required` order
///
/// # Errors
/// * [`SchemaError::MissingFieldsError`] naming every unmatched field
/// * [`SchemaError::AmbiguousColumns`] when strict and a header serves several fields
pub fn reconcile_with<S: AsRef<str>>(headers: &[S], required: &[&str], config: &SchemaConfig) -> Result<ColumnMapping, SchemaError> {
    let headers: Vec<&str> = headers.iter().map(|header| header.as_ref()).collect();
    let mut fields = Vec::with_capacity(required.len());
    let mut missing = Vec::new();
    for field in required {
        match find_header(&headers, field, config.fuzzy_threshold) {
            Some((index, strategy)) => {
                debug!("Column '{}' matched header '{}' ({:?})", field, headers[index], strategy);
                fields.push(MappedField {
                    field: field.to_string(),
                    header: headers[index].to_owned(),
                    index,
                    strategy,
                });
            }
            None => missing.push(field.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(SchemaError::MissingFieldsError(missing));
    }

    let mapping = ColumnMapping { fields };
    let collisions = mapping.collisions();
    for (header, fields) in &collisions {
        warn!("Header '{}' is mapped to several columns: {}", header, fields.join(", "));
    }
    if config.strict_columns && !collisions.is_empty() {
        let described = collisions
            .into_iter()
            .map(|(header, fields)| format!("'{}' ← {}", header, fields.join(", ")))
            .collect();
        return Err(SchemaError::AmbiguousColumns(described));
    }
    Ok(mapping)
}

fn find_header(headers: &[&str], field: &str, threshold: f64) -> Option<(usize, MatchStrategy)> {
    if let Some(index) = headers.iter().position(|header| *header == field) {
        return Some((index, MatchStrategy::Exact));
    }
    let lower = field.to_lowercase();
    if let Some(index) = headers.iter().position(|header| header.to_lowercase() == lower) {
        return Some((index, MatchStrategy::CaseInsensitive));
    }

    let wanted = normalize_header(field);
    if wanted.is_empty() {
        return None;
    }
    let normalized: Vec<String> = headers.iter().map(|header| normalize_header(header)).collect();
    if let Some(index) = normalized.iter().position(|header| *header == wanted) {
        return Some((index, MatchStrategy::Normalized));
    }

    // Best containment ratio; the first header wins ties.
    let mut best: Option<(usize, f64)> = None;
    for (index, header) in normalized.iter().enumerate() {
        if header.is_empty() {
            continue;
        }
        let (shorter, longer) = if header.len() < wanted.len() { (header, &wanted) } else { (&wanted, header) };
        if !longer.contains(shorter.as_str()) {
            continue;
        }
        let ratio = shorter.len() as f64 / longer.len() as f64;
        if ratio >= threshold && best.is_none_or(|(_, score)| ratio > score) {
            best = Some((index, ratio));
        }
    }
    best.map(|(index, ratio)| (index, MatchStrategy::Fuzzy(ratio)))
}
