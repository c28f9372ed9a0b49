//! Turns a [`ClaimRecord`] into the named frame row the preprocessor consumes.

mod engineering;

use std::collections::HashMap;

pub use engineering::ClipStats;
use engineering::Derivation;

use crate::claims::ClaimRecord;
use crate::error::ValidationError;

const SERVICE_DESC: &str = "SERVICE_DESC";
const SRV_DESC: &str = "SRV_DESC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Category(String),
    Text(String),
}

#[derive(Debug, Clone)]
struct Column {
    name: String,
    kind: ColumnKind,
    derivation: Option<Derivation>,
}

/// A raw field the client has to send.
#[derive(Debug, Clone, PartialEq)]
pub struct RequiredField {
    pub name: String,
    pub kind: ColumnKind,
}

/// Base feature columns of the trained model, in training order.
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    columns: Vec<Column>,
    required: Vec<RequiredField>,
    clip_stats: Option<ClipStats>,
}

/// One encoded-ready row, keyed by base feature name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    cells: HashMap<String, Cell>,
}

impl FeatureRow {
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.get(column)
    }
}

impl FeatureSchema {
    pub fn new(
        base_features: &[String],
        num_cols: &[String],
        cat_cols: &[String],
        text_cols: &[String],
        clip_stats: Option<ClipStats>,
    ) -> Result<Self, String> {
        if base_features.is_empty() {
            return Err("no base features declared".to_string());
        }

        let mut columns = Vec::with_capacity(base_features.len());
        for name in base_features {
            if columns.iter().any(|c: &Column| &c.name == name) {
                return Err(format!("base feature {name} is listed twice"));
            }

            let kinds: Vec<ColumnKind> = [
                (num_cols, ColumnKind::Numeric),
                (cat_cols, ColumnKind::Categorical),
                (text_cols, ColumnKind::Text),
            ]
            .into_iter()
            .filter(|(cols, _)| cols.contains(name))
            .map(|(_, kind)| kind)
            .collect();

            let kind = match kinds.as_slice() {
                [kind] => *kind,
                [] => return Err(format!("base feature {name} has no declared column kind")),
                _ => return Err(format!("base feature {name} is declared with several kinds")),
            };

            let derivation = Derivation::for_feature(name);
            if derivation.is_some() && kind != ColumnKind::Numeric {
                return Err(format!("engineered feature {name} must be numeric"));
            }

            columns.push(Column {
                name: name.clone(),
                kind,
                derivation,
            });
        }

        let required = required_fields(&columns)?;

        if let Some(stats) = &clip_stats {
            if let Some((column, bound)) = stats.iter().find(|(_, v)| !v.is_finite()) {
                return Err(format!("clip bound for {column} is not finite ({bound})"));
            }
        }

        Ok(Self {
            columns,
            required,
            clip_stats,
        })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn kind_of(&self, column: &str) -> Option<ColumnKind> {
        self.columns.iter().find(|c| c.name == column).map(|c| c.kind)
    }

    pub fn required_fields(&self) -> &[RequiredField] {
        &self.required
    }

    pub fn has_clip_stats(&self) -> bool {
        self.clip_stats.is_some()
    }

    fn expects_srv_desc(&self) -> bool {
        self.columns.iter().any(|c| c.name == SRV_DESC)
    }

    pub fn row(&self, mut claim: ClaimRecord) -> Result<FeatureRow, ValidationError> {
        if self.expects_srv_desc() {
            claim.alias(SERVICE_DESC, SRV_DESC);
        }

        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|field| !claim.contains(&field.name))
            .map(|field| field.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }

        let mut raw = HashMap::with_capacity(self.required.len());
        for field in &self.required {
            let cell = match field.kind {
                ColumnKind::Numeric => claim.number(&field.name)?.map(Cell::Number),
                ColumnKind::Categorical => claim.category(&field.name)?.map(Cell::Category),
                ColumnKind::Text => claim.text(&field.name)?.map(Cell::Text),
            };
            if let Some(cell) = cell {
                raw.insert(field.name.as_str(), cell);
            }
        }

        let number = |name: &str| match raw.get(name) {
            Some(Cell::Number(v)) => *v,
            _ => f64::NAN,
        };

        let mut cells = HashMap::with_capacity(self.columns.len());
        for column in &self.columns {
            let cell = match &column.derivation {
                Some(derivation) => {
                    Cell::Number(derivation.compute(&number, self.clip_stats.as_ref()))
                }
                None => match raw.get(column.name.as_str()) {
                    Some(cell) => cell.clone(),
                    None => return Err(ValidationError::MissingFields(vec![column.name.clone()])),
                },
            };
            cells.insert(column.name.clone(), cell);
        }

        Ok(FeatureRow { cells })
    }
}

fn required_fields(columns: &[Column]) -> Result<Vec<RequiredField>, String> {
    let mut required: Vec<RequiredField> = Vec::new();
    let mut push = |name: &str, kind: ColumnKind| -> Result<(), String> {
        match required.iter().find(|f| f.name == name) {
            Some(existing) if existing.kind != kind => Err(format!(
                "field {name} is needed both as {:?} and as {:?}",
                existing.kind, kind
            )),
            Some(_) => Ok(()),
            None => {
                required.push(RequiredField {
                    name: name.to_string(),
                    kind,
                });
                Ok(())
            }
        }
    };

    for column in columns {
        match &column.derivation {
            Some(derivation) => {
                for source in derivation.sources() {
                    push(source, ColumnKind::Numeric)?;
                }
            }
            None => push(&column.name, column.kind)?,
        }
    }

    Ok(required)
}
