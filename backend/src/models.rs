use serde::Serialize;

use crate::features::EncodedField;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_probability(probability: f32) -> Self {
        match probability {
            p if p < 0.3 => RiskLevel::Low,
            p if p < 0.5 => RiskLevel::Moderate,
            p if p < 0.75 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Moderate => "MODERATE",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Customer is likely to stay. No action needed.",
            RiskLevel::Moderate => "Keep an eye on this customer at the next billing cycle.",
            RiskLevel::High => "Offer a retention incentive such as a contract upgrade.",
            RiskLevel::Critical => "Contact the customer now with a personalised retention offer.",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChurnPrediction {
    pub probability: f32,
    pub churn: bool,
    pub risk_level: RiskLevel,
    pub recommendation: String,
    pub features: Vec<EncodedField>,
    pub threshold: f32,
    pub model_version: String,
    pub timestamp: String,
}

impl ChurnPrediction {
    pub fn new(
        probability: f32,
        features: Vec<EncodedField>,
        threshold: f32,
        model_version: &str,
    ) -> Self {
        let risk_level = RiskLevel::from_probability(probability);

        ChurnPrediction {
            probability,
            churn: probability >= threshold,
            risk_level,
            recommendation: risk_level.recommendation().to_string(),
            features,
            threshold,
            model_version: model_version.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub version: String,
    pub schema_version: String,
    pub input_width: usize,
    pub threshold: f32,
    pub features: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub timestamp: String,
    pub execution_time_ms: Option<u64>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            errors: Vec::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            execution_time_ms: None,
        }
    }

    pub fn error(message: &str) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            errors: Vec::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            execution_time_ms: None,
        }
    }

    pub fn timed(mut self, start: std::time::Instant) -> Self {
        self.execution_time_ms = Some(start.elapsed().as_millis() as u64);
        self
    }
}
