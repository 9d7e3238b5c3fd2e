use std::path::Path;
use std::str::FromStr;

use tract_onnx::prelude::*;

use crate::error::ModelError;
use crate::features::FeatureVector;

/// Anything that turns a feature vector into a churn probability.
pub trait ChurnModel: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<f32, ModelError>;

    fn input_width(&self) -> usize;

    fn version(&self) -> &str;
}

/// What the model's output node holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Already a probability (sigmoid or softmax head).
    Probability,
    /// Raw logits; sigmoid for one value, softmax for a two-class head.
    Logit,
}

impl FromStr for OutputKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "probability" | "prob" | "sigmoid" => Ok(OutputKind::Probability),
            "logit" | "logits" => Ok(OutputKind::Logit),
            other => Err(format!("unknown model output kind `{}`", other)),
        }
    }
}

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX export of the trained churn network, run with tract.
pub struct OnnxChurnModel {
    plan: OnnxPlan,
    width: usize,
    output: OutputKind,
    version: String,
}

impl OnnxChurnModel {
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        width: usize,
        output: OutputKind,
        version: &str,
    ) -> Result<Self, ModelError> {
        let path = model_path.as_ref();
        let plan = Self::build_plan(path, width).map_err(|e| ModelError::Load {
            path: path.display().to_string(),
            message: format!("{:#}", e),
        })?;

        Ok(Self {
            plan,
            width,
            output,
            version: version.to_string(),
        })
    }

    fn build_plan(path: &Path, width: usize) -> TractResult<OnnxPlan> {
        tract_onnx::onnx()
            .model_for_path(path)?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(1, width)))?
            .into_optimized()?
            .into_runnable()
    }

    fn run(&self, features: &FeatureVector) -> TractResult<Vec<f32>> {
        let input = Tensor::from_shape(&[1, self.width], features.as_slice())?;
        let outputs = self.plan.run(tvec!(input.into()))?;
        let view = outputs[0].to_array_view::<f32>()?;
        Ok(view.iter().copied().collect())
    }
}

impl ChurnModel for OnnxChurnModel {
    fn predict(&self, features: &FeatureVector) -> Result<f32, ModelError> {
        check_width(features.as_slice(), self.width)?;

        let raw = self
            .run(features)
            .map_err(|e| ModelError::Inference(format!("{:#}", e)))?;
        interpret_output(&raw, self.output)
    }

    fn input_width(&self) -> usize {
        self.width
    }

    fn version(&self) -> &str {
        &self.version
    }
}

pub fn check_width(features: &[f32], expected: usize) -> Result<(), ModelError> {
    let actual = features.len();
    if actual != expected {
        return Err(ModelError::WidthMismatch { expected, actual });
    }
    Ok(())
}

/// Reduces the raw output tensor to a churn probability in [0, 1].
///
/// One value is the churn score. Two values are a two-class head and the
/// second is the churn class; as logits they go through softmax, which for
/// two classes is `sigmoid(churn - stay)`.
pub fn interpret_output(raw: &[f32], kind: OutputKind) -> Result<f32, ModelError> {
    let score = match (raw, kind) {
        ([score], _) => *score,
        ([_, churn], OutputKind::Probability) => *churn,
        ([stay, churn], OutputKind::Logit) => churn - stay,
        ([], _) => return Err(ModelError::Inference("model produced no output".into())),
        (other, _) => {
            return Err(ModelError::Inference(format!(
                "expected 1 or 2 output values, got {}",
                other.len()
            )))
        }
    };

    let probability = match kind {
        OutputKind::Probability => score,
        OutputKind::Logit => sigmoid(score),
    };
    if probability.is_nan() {
        return Err(ModelError::Inference("model produced NaN".into()));
    }
    Ok(probability.clamp(0.0, 1.0))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_output_kind() {
        assert_eq!("probability".parse(), Ok(OutputKind::Probability));
        assert_eq!(" Logit ".parse(), Ok(OutputKind::Logit));
        assert!("softmax2".parse::<OutputKind>().is_err());
    }

    #[test]
    fn single_probability_passes_through() {
        assert_eq!(interpret_output(&[0.73], OutputKind::Probability).unwrap(), 0.73);
    }

    #[test]
    fn logit_gets_sigmoid() {
        assert_eq!(interpret_output(&[0.0], OutputKind::Logit).unwrap(), 0.5);
        assert!(interpret_output(&[6.0], OutputKind::Logit).unwrap() > 0.99);
    }

    #[test]
    fn two_class_head_uses_second_value() {
        assert_eq!(
            interpret_output(&[0.2, 0.8], OutputKind::Probability).unwrap(),
            0.8
        );
    }

    #[test]
    fn two_class_logits_use_softmax() {
        assert_eq!(interpret_output(&[2.0, 2.0], OutputKind::Logit).unwrap(), 0.5);
        let p = interpret_output(&[-1.0, 1.0], OutputKind::Logit).unwrap();
        let softmax = 1.0_f32.exp() / ((-1.0_f32).exp() + 1.0_f32.exp());
        assert!((p - softmax).abs() < 1e-6, "got {}", p);
        assert!(interpret_output(&[3.0, -3.0], OutputKind::Logit).unwrap() < 0.01);
    }

    #[test]
    fn width_mismatch_is_reported() {
        assert!(matches!(
            check_width(&[0.0; 18], 19),
            Err(ModelError::WidthMismatch {
                expected: 19,
                actual: 18
            })
        ));
        assert!(check_width(&[0.0; 19], 19).is_ok());
    }

    #[test]
    fn clamps_and_rejects_bad_output() {
        assert_eq!(interpret_output(&[1.2], OutputKind::Probability).unwrap(), 1.0);
        assert!(interpret_output(&[f32::NAN], OutputKind::Probability).is_err());
        assert!(interpret_output(&[], OutputKind::Probability).is_err());
        assert!(interpret_output(&[0.1, 0.2, 0.7], OutputKind::Probability).is_err());
    }

    #[test]
    fn missing_model_file_is_load_error() {
        let err = OnnxChurnModel::load("/nonexistent/churn.onnx", 19, OutputKind::Probability, "1")
            .err()
            .unwrap();
        assert!(matches!(err, ModelError::Load { .. }));
    }
}
