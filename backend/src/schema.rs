//! Declarative field table describing how a customer record becomes the
//! model's input vector.
//!
//! Field order is the model's input order. A deployment whose model was
//! trained with a different column order or category coding ships its own
//! table as JSON and points `CHURN_SCHEMA_PATH` at it.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// Literal form value -> numeric code, matched by exact string equality.
    Categorical { codes: BTreeMap<String, f32> },
    /// Raw numeric value, optionally range-checked.
    Numeric {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f32>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn categorical(name: &str, label: &str, codes: &[(&str, f32)]) -> Self {
        FieldSpec {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Categorical {
                codes: codes
                    .iter()
                    .map(|(value, code)| (value.to_string(), *code))
                    .collect(),
            },
        }
    }

    pub fn numeric(name: &str, label: &str, min: Option<f32>, max: Option<f32>) -> Self {
        FieldSpec {
            name: name.to_string(),
            label: label.to_string(),
            kind: FieldKind::Numeric { min, max },
        }
    }

    /// Accepted literal values of a categorical field, comma-separated.
    pub fn expected_values(&self) -> String {
        match &self.kind {
            FieldKind::Categorical { codes } => codes
                .keys()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            FieldKind::Numeric { .. } => "a number".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    #[serde(default = "default_version")]
    pub version: String,
    pub fields: Vec<FieldSpec>,
}

fn default_version() -> String {
    "custom".to_string()
}

const NO_YES: &[(&str, f32)] = &[("n", 0.0), ("y", 1.0)];
const INTERNET_ADDON: &[(&str, f32)] = &[("n", 0.0), ("nis", 1.0), ("y", 2.0)];

impl FeatureSchema {
    /// Built-in schema for the telecom churn model.
    pub fn telecom() -> Self {
        FeatureSchema {
            version: "telecom-v1".to_string(),
            fields: vec![
                FieldSpec::categorical("gender", "Gender", &[("f", 0.0), ("m", 1.0)]),
                FieldSpec::categorical("srcitizen", "Senior citizen", NO_YES),
                FieldSpec::categorical("partner", "Partner", NO_YES),
                FieldSpec::categorical("dependents", "Dependents", NO_YES),
                FieldSpec::numeric("tenure", "Tenure (months)", Some(0.0), Some(120.0)),
                FieldSpec::categorical("phservices", "Phone service", NO_YES),
                FieldSpec::categorical(
                    "multilines",
                    "Multiple lines",
                    &[("n", 0.0), ("nps", 1.0), ("y", 2.0)],
                ),
                FieldSpec::categorical(
                    "internet",
                    "Internet service",
                    &[("dsl", 0.0), ("fiber", 1.0), ("n", 2.0)],
                ),
                FieldSpec::categorical("onlinesecurity", "Online security", INTERNET_ADDON),
                FieldSpec::categorical("onlinebackup", "Online backup", INTERNET_ADDON),
                FieldSpec::categorical("deviceprotection", "Device protection", INTERNET_ADDON),
                FieldSpec::categorical("techsupport", "Tech support", INTERNET_ADDON),
                FieldSpec::categorical("streamingtv", "Streaming TV", INTERNET_ADDON),
                FieldSpec::categorical("streamingmovies", "Streaming movies", INTERNET_ADDON),
                FieldSpec::categorical(
                    "contract",
                    "Contract",
                    &[("m2m", 0.0), ("1y", 1.0), ("2y", 2.0)],
                ),
                FieldSpec::categorical("paperless", "Paperless billing", NO_YES),
                FieldSpec::categorical(
                    "payment",
                    "Payment method",
                    &[("bank", 0.0), ("card", 1.0), ("echeck", 2.0), ("mcheck", 3.0)],
                ),
                FieldSpec::numeric("monthlycharges", "Monthly charges", Some(0.0), None),
                FieldSpec::numeric("totalcharges", "Total charges", Some(0.0), None),
            ],
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: FeatureSchema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::Invalid("schema has no fields".into()));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(SchemaError::Invalid("field with empty name".into()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::Invalid(format!(
                    "duplicate field `{}`",
                    field.name
                )));
            }
            match &field.kind {
                FieldKind::Categorical { codes } => {
                    if codes.is_empty() {
                        return Err(SchemaError::Invalid(format!(
                            "categorical field `{}` has no codes",
                            field.name
                        )));
                    }
                    if codes.values().any(|code| !code.is_finite()) {
                        return Err(SchemaError::Invalid(format!(
                            "categorical field `{}` has a non-finite code",
                            field.name
                        )));
                    }
                }
                FieldKind::Numeric {
                    min: Some(min),
                    max: Some(max),
                } if min > max => {
                    return Err(SchemaError::Invalid(format!(
                        "numeric field `{}` has min {} > max {}",
                        field.name, min, max
                    )));
                }
                FieldKind::Numeric { .. } => {}
            }
        }
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|field| field.name.clone()).collect()
    }
}
