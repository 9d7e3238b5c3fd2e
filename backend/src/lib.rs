//! Web front end and JSON API for the telecom customer churn model.
//!
//! A customer record (HTML form or JSON) is encoded into the model's
//! feature vector through a declarative [`schema::FeatureSchema`], scored by
//! a [`inference::ChurnModel`], and returned as a [`models::ChurnPrediction`].

pub mod config;
pub mod error;
pub mod features;
pub mod inference;
pub mod models;
pub mod pages;
pub mod ratelimit;
pub mod routes;
pub mod schema;
pub mod stats;

pub use config::ServerConfig;
pub use error::{AppError, EncodeError, InvalidRecord, ModelError, SchemaError};
pub use features::{encode, FeatureVector, RawRecord, RawValue};
pub use inference::{ChurnModel, OnnxChurnModel, OutputKind};
pub use routes::AppState;
pub use schema::FeatureSchema;
