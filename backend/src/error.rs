use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::ApiResponse;

/// A single problem found while encoding one field of a customer record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("missing field `{field}`")]
    MissingField { field: String },
    #[error("unrecognized value {value:?} for field `{field}` (expected one of: {expected})")]
    UnrecognizedValue {
        field: String,
        value: String,
        expected: String,
    },
    #[error("field `{field}` must be a number (got {value:?})")]
    NotANumber { field: String, value: String },
    #[error("field `{field}` is out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f32,
        min: f32,
        max: f32,
    },
}

impl EncodeError {
    pub fn field(&self) -> &str {
        match self {
            EncodeError::MissingField { field }
            | EncodeError::UnrecognizedValue { field, .. }
            | EncodeError::NotANumber { field, .. }
            | EncodeError::OutOfRange { field, .. } => field,
        }
    }
}

/// Every problem found in a record, in schema order.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", join_problems(.0))]
pub struct InvalidRecord(pub Vec<EncodeError>);

impl InvalidRecord {
    pub fn problems(&self) -> &[EncodeError] {
        &self.0
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

fn join_problems(problems: &[EncodeError]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("cannot read schema file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse schema: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid schema: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to load model from {path}: {message}")]
    Load { path: String, message: String },
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("feature vector has {actual} values, model expects {expected}")]
    WidthMismatch { expected: usize, actual: usize },
}

/// Errors surfaced by the JSON API. Rendered as an `ApiResponse` envelope.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] InvalidRecord),
    #[error("record {index}: {source}")]
    BatchRecord {
        index: usize,
        #[source]
        source: InvalidRecord,
    },
    #[error("batch is empty")]
    EmptyBatch,
    #[error("batch has {size} records, the limit is {limit}")]
    BatchTooLarge { size: usize, limit: usize },
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("blocking task failed: {0}")]
    Blocking(String),
}

impl AppError {
    fn details(&self) -> Vec<String> {
        match self {
            AppError::InvalidRecord(invalid) => invalid.messages(),
            AppError::BatchRecord { index, source } => source
                .problems()
                .iter()
                .map(|problem| format!("record {}: {}", index, problem))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRecord(_)
            | AppError::BatchRecord { .. }
            | AppError::EmptyBatch
            | AppError::BatchTooLarge { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Model(_) | AppError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = ApiResponse::<()>::error(&self.to_string());
        body.errors = self.details();
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_record_joins_every_problem() {
        let invalid = InvalidRecord(vec![
            EncodeError::MissingField {
                field: "gender".into(),
            },
            EncodeError::NotANumber {
                field: "tenure".into(),
                value: "ten".into(),
            },
        ]);
        assert_eq!(
            invalid.to_string(),
            "missing field `gender`; field `tenure` must be a number (got \"ten\")"
        );
    }

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(AppError::EmptyBatch.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::Unauthorized("missing API key").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Model(ModelError::Inference("boom".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn batch_record_details_carry_index() {
        let err = AppError::BatchRecord {
            index: 3,
            source: InvalidRecord(vec![EncodeError::MissingField {
                field: "partner".into(),
            }]),
        };
        assert_eq!(err.details(), vec!["record 3: missing field `partner`"]);
    }
}
