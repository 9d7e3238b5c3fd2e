use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, InvalidRecord};
use crate::schema::{FeatureSchema, FieldKind, FieldSpec};

/// A raw value as submitted by the form or the JSON API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Text(String),
    Number(f64),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Text(text) => f.write_str(text),
            RawValue::Number(number) => write!(f, "{}", number),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

/// One customer as submitted: field name -> raw value. Extra fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(HashMap<String, RawValue>);

impl RawRecord {
    pub fn from_form(form: HashMap<String, String>) -> Self {
        RawRecord(
            form.into_iter()
                .map(|(name, value)| (name, RawValue::Text(value)))
                .collect(),
        )
    }

    pub fn insert<V: Into<RawValue>>(&mut self, name: &str, value: V) -> &mut Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<RawValue> {
        self.0.remove(name)
    }
}

impl<K: Into<String>, V: Into<RawValue>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RawRecord(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// Model input in schema order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// A field's name next to the value the model saw for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedField {
    pub name: String,
    pub label: String,
    pub value: f32,
}

/// Encodes one raw value according to its field spec.
///
/// Categorical values must equal one of the field's codes exactly. Numeric
/// values must parse as a finite number within the field's range. An empty
/// value counts as missing.
pub fn encode_value(spec: &FieldSpec, raw: &RawValue) -> Result<f32, EncodeError> {
    if let RawValue::Text(text) = raw {
        if text.trim().is_empty() {
            return Err(EncodeError::MissingField {
                field: spec.name.clone(),
            });
        }
    }

    match &spec.kind {
        FieldKind::Categorical { codes } => {
            let literal = raw.to_string();
            codes
                .get(&literal)
                .copied()
                .ok_or_else(|| EncodeError::UnrecognizedValue {
                    field: spec.name.clone(),
                    value: literal,
                    expected: spec.expected_values(),
                })
        }
        FieldKind::Numeric { min, max } => {
            let value = match raw {
                RawValue::Number(number) => *number as f32,
                RawValue::Text(text) => {
                    text.trim()
                        .parse::<f32>()
                        .map_err(|_| EncodeError::NotANumber {
                            field: spec.name.clone(),
                            value: text.clone(),
                        })?
                }
            };
            if !value.is_finite() {
                return Err(EncodeError::NotANumber {
                    field: spec.name.clone(),
                    value: raw.to_string(),
                });
            }

            let lo = min.unwrap_or(f32::NEG_INFINITY);
            let hi = max.unwrap_or(f32::INFINITY);
            if value < lo || value > hi {
                return Err(EncodeError::OutOfRange {
                    field: spec.name.clone(),
                    value,
                    min: lo,
                    max: hi,
                });
            }
            Ok(value)
        }
    }
}

/// Builds the feature vector for `record`, reporting every invalid field.
pub fn encode(schema: &FeatureSchema, record: &RawRecord) -> Result<FeatureVector, InvalidRecord> {
    let mut values = Vec::with_capacity(schema.width());
    let mut problems = Vec::new();

    for spec in &schema.fields {
        let result = match record.get(&spec.name) {
            Some(raw) => encode_value(spec, raw),
            None => Err(EncodeError::MissingField {
                field: spec.name.clone(),
            }),
        };
        match result {
            Ok(value) => values.push(value),
            Err(problem) => problems.push(problem),
        }
    }

    if problems.is_empty() {
        Ok(FeatureVector(values))
    } else {
        Err(InvalidRecord(problems))
    }
}

pub fn describe(schema: &FeatureSchema, features: &FeatureVector) -> Vec<EncodedField> {
    schema
        .fields
        .iter()
        .zip(features.as_slice())
        .map(|(spec, value)| EncodedField {
            name: spec.name.clone(),
            label: spec.label.clone(),
            value: *value,
        })
        .collect()
}
