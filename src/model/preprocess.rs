//! Column encoders replaying the fitted training-time transformer.
//!
//! Each transformer reads one or more named columns from a [`FeatureRow`] and
//! appends a fixed number of values to the encoded vector. Outputs are
//! concatenated in declaration order.

use std::collections::HashMap;

use serde::Deserialize;
use unicode_normalization::char::is_combining_mark;

use crate::error::InferenceError;
use crate::features::{Cell, ColumnKind, FeatureRow, FeatureSchema};

#[derive(Debug, Clone, Deserialize)]
pub struct Preprocessor {
    pub transformers: Vec<Transformer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transformer {
    Numeric(NumericColumns),
    OneHot(OneHotColumn),
    Tfidf(TfidfColumn),
}

/// Pass-through numeric columns, optionally standardised.
#[derive(Debug, Clone, Deserialize)]
pub struct NumericColumns {
    pub columns: Vec<String>,
    #[serde(default)]
    pub mean: Option<Vec<f64>>,
    #[serde(default)]
    pub scale: Option<Vec<f64>>,
}

/// Unknown categories encode as all zeros.
#[derive(Debug, Clone, Deserialize)]
pub struct OneHotColumn {
    pub column: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TfidfColumn {
    pub column: String,
    pub vocabulary: HashMap<String, usize>,
    pub idf: Vec<f64>,
    #[serde(default = "unigrams")]
    pub ngram_range: (usize, usize),
    #[serde(default = "enabled")]
    pub lowercase: bool,
    #[serde(default)]
    pub sublinear_tf: bool,
}

fn unigrams() -> (usize, usize) {
    (1, 1)
}

fn enabled() -> bool {
    true
}

impl Preprocessor {
    pub fn width(&self) -> usize {
        self.transformers.iter().map(Transformer::width).sum()
    }

    pub fn validate(&self, schema: &FeatureSchema) -> Result<(), String> {
        if self.transformers.is_empty() {
            return Err("preprocessor has no transformers".to_string());
        }
        self.transformers
            .iter()
            .try_for_each(|transformer| transformer.validate(schema))
    }

    pub fn encode(&self, row: &FeatureRow) -> Result<Vec<f32>, InferenceError> {
        let mut out = Vec::with_capacity(self.width());
        for transformer in &self.transformers {
            transformer.encode(row, &mut out)?;
        }
        Ok(out)
    }
}

impl Transformer {
    pub fn width(&self) -> usize {
        match self {
            Transformer::Numeric(t) => t.columns.len(),
            Transformer::OneHot(t) => t.categories.len(),
            Transformer::Tfidf(t) => t.idf.len(),
        }
    }

    fn validate(&self, schema: &FeatureSchema) -> Result<(), String> {
        match self {
            Transformer::Numeric(t) => t.validate(schema),
            Transformer::OneHot(t) => {
                expect_kind(schema, &t.column, ColumnKind::Categorical)?;
                if t.categories.is_empty() {
                    return Err(format!("one-hot encoder for {} has no categories", t.column));
                }
                Ok(())
            }
            Transformer::Tfidf(t) => t.validate(schema),
        }
    }

    fn encode(&self, row: &FeatureRow, out: &mut Vec<f32>) -> Result<(), InferenceError> {
        match self {
            Transformer::Numeric(t) => t.encode(row, out),
            Transformer::OneHot(t) => {
                let value = match row.get(&t.column) {
                    Some(Cell::Category(value)) => value,
                    _ => return Err(encoding_error(&t.column, "expected a category")),
                };
                out.extend(
                    t.categories
                        .iter()
                        .map(|category| if category == value { 1.0 } else { 0.0 }),
                );
                Ok(())
            }
            Transformer::Tfidf(t) => t.encode(row, out),
        }
    }
}

impl NumericColumns {
    fn validate(&self, schema: &FeatureSchema) -> Result<(), String> {
        for column in &self.columns {
            expect_kind(schema, column, ColumnKind::Numeric)?;
        }
        if let Some(mean) = &self.mean {
            if mean.len() != self.columns.len() {
                return Err("numeric mean length does not match its columns".to_string());
            }
        }
        if let Some(scale) = &self.scale {
            if scale.len() != self.columns.len() {
                return Err("numeric scale length does not match its columns".to_string());
            }
            if scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return Err("numeric scale must be finite and non-zero".to_string());
            }
        }
        Ok(())
    }

    fn encode(&self, row: &FeatureRow, out: &mut Vec<f32>) -> Result<(), InferenceError> {
        for (i, column) in self.columns.iter().enumerate() {
            let mut value = match row.get(column) {
                Some(Cell::Number(v)) => *v,
                _ => return Err(encoding_error(column, "expected a number")),
            };
            if let Some(mean) = &self.mean {
                value -= mean[i];
            }
            if let Some(scale) = &self.scale {
                value /= scale[i];
            }
            out.push(value as f32);
        }
        Ok(())
    }
}

impl TfidfColumn {
    fn validate(&self, schema: &FeatureSchema) -> Result<(), String> {
        expect_kind(schema, &self.column, ColumnKind::Text)?;
        let (lo, hi) = self.ngram_range;
        if lo == 0 || lo > hi {
            return Err(format!("invalid ngram range for {}", self.column));
        }
        if let Some((term, index)) = self
            .vocabulary
            .iter()
            .find(|(_, index)| **index >= self.idf.len())
        {
            return Err(format!(
                "term {term:?} of {} maps to column {index} beyond {} idf weights",
                self.column,
                self.idf.len()
            ));
        }
        Ok(())
    }

    fn terms(&self, text: &str) -> Vec<String> {
        let text = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        let tokens: Vec<&str> = text
            .split(|c: char| !is_word_char(c))
            .filter(|token| token.chars().count() >= 2)
            .collect();

        let (lo, hi) = self.ngram_range;
        let mut terms = Vec::new();
        for n in lo..=hi {
            terms.extend(tokens.windows(n).map(|gram| gram.join(" ")));
        }
        terms
    }

    fn encode(&self, row: &FeatureRow, out: &mut Vec<f32>) -> Result<(), InferenceError> {
        let text = match row.get(&self.column) {
            Some(Cell::Text(text)) => text,
            _ => return Err(encoding_error(&self.column, "expected text")),
        };

        let mut counts: HashMap<usize, f64> = HashMap::new();
        for term in self.terms(text) {
            if let Some(&index) = self.vocabulary.get(&term) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let mut weights = vec![0.0f64; self.idf.len()];
        for (index, count) in counts {
            let tf = if self.sublinear_tf {
                1.0 + count.ln()
            } else {
                count
            };
            weights[index] = tf * self.idf[index];
        }

        let norm = weights.iter().map(|w| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            weights.iter_mut().for_each(|w| *w /= norm);
        }

        out.extend(weights.into_iter().map(|w| w as f32));
        Ok(())
    }
}

fn expect_kind(schema: &FeatureSchema, column: &str, kind: ColumnKind) -> Result<(), String> {
    match schema.kind_of(column) {
        Some(actual) if actual == kind => Ok(()),
        Some(actual) => Err(format!(
            "transformer expects {column} to be {kind:?} but metadata declares {actual:?}"
        )),
        None => Err(format!("transformer reads {column}, which is not a base feature")),
    }
}

/// Word characters as the training tokenizer sees them: letters, digits and
/// `_`, but not the combining marks that Unicode counts as alphabetic.
fn is_word_char(c: char) -> bool {
    c == '_' || (c.is_alphanumeric() && !is_combining_mark(c))
}

fn encoding_error(column: &str, reason: &'static str) -> InferenceError {
    InferenceError::Encoding {
        column: column.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::ClaimRecord;
    use serde_json::{json, Value};

    fn schema() -> FeatureSchema {
        let names = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        FeatureSchema::new(
            &names(&["CLAIMED_AMOUNT", "COVER", "DIAGNOSIS_DESCRIPTION"]),
            &names(&["CLAIMED_AMOUNT"]),
            &names(&["COVER"]),
            &names(&["DIAGNOSIS_DESCRIPTION"]),
            None,
        )
        .unwrap()
    }

    fn row(value: Value) -> FeatureRow {
        let Value::Object(map) = value else {
            panic!("fixture must be an object")
        };
        schema().row(ClaimRecord::from_object(map).unwrap()).unwrap()
    }

    fn preprocessor(value: Value) -> Preprocessor {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn concatenates_transformer_outputs_in_order() {
        let pre = preprocessor(json!({"transformers": [
            {"kind": "numeric", "columns": ["CLAIMED_AMOUNT"], "mean": [100.0], "scale": [50.0]},
            {"kind": "one_hot", "column": "COVER", "categories": ["PREMIUM", "STANDARD"]},
            {"kind": "tfidf", "column": "DIAGNOSIS_DESCRIPTION",
             "vocabulary": {"check": 0, "routine": 1}, "idf": [1.0, 1.0]}
        ]}));
        pre.validate(&schema()).unwrap();
        assert_eq!(pre.width(), 5);

        let encoded = pre
            .encode(&row(json!({
                "claimed_amount": 200,
                "cover": "STANDARD",
                "diagnosis_description": "Routine check"
            })))
            .unwrap();

        let half = (0.5f64).sqrt() as f32;
        assert_eq!(encoded.len(), 5);
        assert_eq!(encoded[0], 2.0);
        assert_eq!(&encoded[1..3], &[0.0, 1.0]);
        assert!((encoded[3] - half).abs() < 1e-6);
        assert!((encoded[4] - half).abs() < 1e-6);
    }

    #[test]
    fn unknown_category_is_all_zeros() {
        let pre = preprocessor(json!({"transformers": [
            {"kind": "one_hot", "column": "COVER", "categories": ["PREMIUM", "STANDARD"]}
        ]}));
        let encoded = pre
            .encode(&row(json!({
                "claimed_amount": 1, "cover": "GOLD", "diagnosis_description": ""
            })))
            .unwrap();
        assert_eq!(encoded, vec![0.0, 0.0]);
    }

    #[test]
    fn tfidf_weights_counts_by_idf_and_normalises() {
        let pre = preprocessor(json!({"transformers": [
            {"kind": "tfidf", "column": "DIAGNOSIS_DESCRIPTION",
             "vocabulary": {"pain": 0, "chest": 1, "chest pain": 2},
             "idf": [1.0, 2.0, 3.0], "ngram_range": [1, 2]}
        ]}));
        let encoded = pre
            .encode(&row(json!({
                "claimed_amount": 1, "cover": "GOLD",
                "diagnosis_description": "Chest pain, PAIN a"
            })))
            .unwrap();

        // pain x2 (idf 1), chest x1 (idf 2), "chest pain" x1 (idf 3); "a" is too short
        let raw = [2.0f64, 2.0, 3.0];
        let norm = raw.iter().map(|w| w * w).sum::<f64>().sqrt();
        for (got, want) in encoded.iter().zip(raw.iter()) {
            assert!((*got as f64 - want / norm).abs() < 1e-6);
        }
    }

    #[test]
    fn combining_marks_split_tokens() {
        let pre = preprocessor(json!({"transformers": [
            {"kind": "tfidf", "column": "DIAGNOSIS_DESCRIPTION",
             "vocabulary": {"ab": 0, "cd": 1}, "idf": [1.0, 1.0]}
        ]}));
        let encoded = pre
            .encode(&row(json!({
                "claimed_amount": 1, "cover": "GOLD",
                "diagnosis_description": "ab\u{0301}cd"
            })))
            .unwrap();

        let half = std::f32::consts::FRAC_1_SQRT_2;
        assert!(encoded.iter().all(|v| (v - half).abs() < 1e-6));
    }

    #[test]
    fn text_without_known_terms_encodes_to_zeros() {
        let pre = preprocessor(json!({"transformers": [
            {"kind": "tfidf", "column": "DIAGNOSIS_DESCRIPTION",
             "vocabulary": {"fracture": 0}, "idf": [1.7]}
        ]}));
        let encoded = pre
            .encode(&row(json!({
                "claimed_amount": 1, "cover": "GOLD", "diagnosis_description": "flu"
            })))
            .unwrap();
        assert_eq!(encoded, vec![0.0]);
    }

    #[test]
    fn validation_catches_contract_mismatches() {
        let wrong_kind = preprocessor(json!({"transformers": [
            {"kind": "numeric", "columns": ["COVER"]}
        ]}));
        assert!(wrong_kind.validate(&schema()).is_err());

        let unknown_column = preprocessor(json!({"transformers": [
            {"kind": "one_hot", "column": "REGION", "categories": ["A"]}
        ]}));
        assert!(unknown_column.validate(&schema()).is_err());

        let vocabulary_overflow = preprocessor(json!({"transformers": [
            {"kind": "tfidf", "column": "DIAGNOSIS_DESCRIPTION",
             "vocabulary": {"flu": 3}, "idf": [1.0]}
        ]}));
        assert!(vocabulary_overflow.validate(&schema()).is_err());

        let zero_scale = preprocessor(json!({"transformers": [
            {"kind": "numeric", "columns": ["CLAIMED_AMOUNT"], "scale": [0.0]}
        ]}));
        assert!(zero_scale.validate(&schema()).is_err());
    }
}
