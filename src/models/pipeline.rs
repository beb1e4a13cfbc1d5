//! Trained pipeline and label decoder artifacts

use crate::models::schema::{EncodedRecord, EncodedValue, Schema};
use anyhow::{Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::tensor::TensorElementType;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor, ValueType};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// A fitted preprocessing + classification pipeline.
///
/// Implementations take one coerced record and return the internal class
/// index of the predicted price bracket.
pub trait PricePipeline: Send + Sync {
    /// Column partition the preprocessing step was fit on
    fn schema(&self) -> &Schema;

    /// Transform and classify a single record
    fn predict_class(&self, record: &EncodedRecord) -> Result<i64>;
}

/// Maps internal class indices back to price bracket labels.
///
/// Stored as the fitted class list in index order, e.g. `["High", "Low", "Medium"]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct LabelDecoder {
    classes: Vec<String>,
}

impl LabelDecoder {
    pub fn new(classes: Vec<String>) -> Result<Self> {
        if classes.is_empty() {
            anyhow::bail!("label decoder has no classes");
        }
        let mut seen = HashSet::new();
        for class in &classes {
            if !seen.insert(class.as_str()) {
                anyhow::bail!("label decoder lists class `{}` more than once", class);
            }
        }
        Ok(Self { classes })
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Failed to decode label classes")
    }

    /// Decode a class index
    pub fn decode(&self, index: i64) -> Result<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.classes.get(i))
            .map(String::as_str)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "class index {} outside decoder range 0..{}",
                    index,
                    self.classes.len()
                )
            })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

impl TryFrom<Vec<String>> for LabelDecoder {
    type Error = anyhow::Error;

    fn try_from(classes: Vec<String>) -> Result<Self> {
        Self::new(classes)
    }
}

/// Element type accepted by one graph input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Float32,
    Float64,
    Int64,
    Int32,
    String,
}

impl InputKind {
    fn from_element_type(ty: TensorElementType) -> Option<Self> {
        match ty {
            TensorElementType::Float32 => Some(InputKind::Float32),
            TensorElementType::Float64 => Some(InputKind::Float64),
            TensorElementType::Int64 => Some(InputKind::Int64),
            TensorElementType::Int32 => Some(InputKind::Int32),
            TensorElementType::String => Some(InputKind::String),
            _ => None,
        }
    }
}

/// One named graph input, one value per record
#[derive(Debug, Clone)]
struct InputSpec {
    name: String,
    kind: InputKind,
    rank: usize,
}

impl InputSpec {
    fn shape(&self) -> Vec<i64> {
        if self.rank <= 1 {
            vec![1]
        } else {
            vec![1, 1]
        }
    }

    fn to_value(&self, value: &EncodedValue) -> Result<DynValue> {
        let shape = self.shape();
        let tensor = match (self.kind, value) {
            (InputKind::String, v) => {
                Tensor::from_string_array((shape, &[v.to_string()][..]))?.into_dyn()
            }
            (InputKind::Float32, EncodedValue::Numeric(n)) => {
                Tensor::from_array((shape, vec![*n as f32]))?.into_dyn()
            }
            (InputKind::Float64, EncodedValue::Numeric(n)) => {
                Tensor::from_array((shape, vec![*n]))?.into_dyn()
            }
            (InputKind::Int64, EncodedValue::Numeric(n)) => {
                Tensor::from_array((shape, vec![self.integer(*n)?]))?.into_dyn()
            }
            (InputKind::Int32, EncodedValue::Numeric(n)) => {
                let value = i32::try_from(self.integer(*n)?).map_err(|_| {
                    anyhow::anyhow!("input `{}` is int32 but received {}", self.name, n)
                })?;
                Tensor::from_array((shape, vec![value]))?.into_dyn()
            }
            (_, EncodedValue::Categorical(s)) => {
                anyhow::bail!("input `{}` is numeric but received text `{}`", self.name, s)
            }
        };
        Ok(tensor)
    }

    /// Integer-typed inputs only take whole numbers
    fn integer(&self, n: f64) -> Result<i64> {
        if !n.is_finite() || n.fract() != 0.0 || n.abs() > i64::MAX as f64 {
            anyhow::bail!("input `{}` is integer-typed but received {}", self.name, n);
        }
        Ok(n as i64)
    }
}

/// Pipeline exported to ONNX, run through ONNX Runtime.
///
/// Each training column is a separate graph input: string tensors for
/// categorical columns, numeric tensors for numeric ones. The schema is read
/// from those inputs once, when the session is created.
pub struct OnnxPipeline {
    /// ONNX Runtime session (runs need exclusive access)
    session: Mutex<Session>,
    inputs: Vec<InputSpec>,
    schema: Schema,
    /// Predicted class index output, when the graph exposes one
    label_output: Option<String>,
    /// Class probability output, used when there is no label output
    probability_output: Option<String>,
}

impl OnnxPipeline {
    /// Load a pipeline from an ONNX file
    pub fn load<P: AsRef<Path>>(path: P, onnx_threads: usize) -> Result<Self> {
        let path = path.as_ref();

        ort::init().commit()?;

        info!(path = %path.display(), threads = onnx_threads, "Loading ONNX pipeline");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(onnx_threads)?
            .commit_from_file(path)
            .context(format!("Failed to load pipeline from {:?}", path))?;

        let mut inputs = Vec::with_capacity(session.inputs.len());
        let mut numeric = Vec::new();
        let mut categorical = Vec::new();

        for input in &session.inputs {
            let (ty, rank) = match &input.input_type {
                ValueType::Tensor { ty, shape, .. } => (*ty, shape.len()),
                other => anyhow::bail!("input `{}` is not a tensor: {:?}", input.name, other),
            };
            let kind = InputKind::from_element_type(ty).ok_or_else(|| {
                anyhow::anyhow!("input `{}` has unsupported element type {:?}", input.name, ty)
            })?;

            if kind == InputKind::String {
                categorical.push(input.name.clone());
            } else {
                numeric.push(input.name.clone());
            }
            inputs.push(InputSpec {
                name: input.name.clone(),
                kind,
                rank,
            });
        }

        let schema = Schema::new(numeric, categorical).map_err(anyhow::Error::msg)?;
        if schema.is_empty() {
            anyhow::bail!("pipeline declares no inputs");
        }

        let label_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("label"))
            .map(|o| o.name.clone());

        let probability_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .map(|o| o.name.clone());

        if label_output.is_none() && probability_output.is_none() {
            anyhow::bail!("pipeline exposes neither a label nor a probability output");
        }

        info!(
            numeric = schema.numeric_columns().len(),
            categorical = schema.categorical_columns().len(),
            label_output = ?label_output,
            probability_output = ?probability_output,
            "Pipeline loaded successfully"
        );

        Ok(Self {
            session: Mutex::new(session),
            inputs,
            schema,
            label_output,
            probability_output,
        })
    }

    fn extract_class(&self, outputs: &SessionOutputs) -> Result<i64> {
        let label = self.label_output.as_deref().and_then(|name| outputs.get(name));
        let probability = self
            .probability_output
            .as_deref()
            .and_then(|name| outputs.get(name));
        class_from_outputs(label, probability)
    }
}

impl PricePipeline for OnnxPipeline {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn predict_class(&self, record: &EncodedRecord) -> Result<i64> {
        let mut feeds: Vec<(String, DynValue)> = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let value = record
                .get(&input.name)
                .ok_or_else(|| anyhow::anyhow!("record has no value for input `{}`", input.name))?;
            let tensor = input
                .to_value(value)
                .with_context(|| format!("Failed to build tensor for `{}`", input.name))?;
            feeds.push((input.name.clone(), tensor));
        }

        let mut session = lock_session(&self.session);
        let outputs = session.run(feeds)?;

        self.extract_class(&outputs)
    }
}

/// A panic during an earlier run leaves the session usable; only the guard is poisoned.
fn lock_session<T>(session: &Mutex<T>) -> MutexGuard<'_, T> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Class index from the label output, falling back to the argmax of the
/// probability output.
fn class_from_outputs(label: Option<&DynValue>, probability: Option<&DynValue>) -> Result<i64> {
    if let Some(output) = label {
        if let Ok((_, data)) = output.try_extract_tensor::<i64>() {
            if let Some(&class) = data.first() {
                debug!(class = class, "Extracted class from label tensor");
                return Ok(class);
            }
        }
    }

    let output = probability.ok_or_else(|| anyhow::anyhow!("pipeline produced no usable output"))?;

    // Tensor format: [1, num_classes]
    if let Ok((_, data)) = output.try_extract_tensor::<f32>() {
        return argmax(data.iter().enumerate().map(|(i, &p)| (i as i64, p)));
    }

    // Sequence format: seq(map(int64, float)), as produced by zipmap
    if DynSequenceValueType::can_downcast(&output.dtype()) {
        return extract_from_sequence_map(output);
    }

    anyhow::bail!("probability output has an unsupported format")
}

fn extract_from_sequence_map(output: &DynValue) -> Result<i64> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow::anyhow!("Failed to downcast to sequence: {}", e))?;

    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
    let map_value = maps
        .first()
        .ok_or_else(|| anyhow::anyhow!("Empty sequence"))?;

    let kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;
    argmax(kv_pairs.into_iter())
}

/// Class with the highest probability; ties go to the lowest index.
fn argmax(scores: impl Iterator<Item = (i64, f32)>) -> Result<i64> {
    let mut best: Option<(i64, f32)> = None;
    for (class, prob) in scores {
        match best {
            Some((_, best_prob)) if prob <= best_prob => {}
            _ => best = Some((class, prob)),
        }
    }
    best.map(|(class, _)| class)
        .ok_or_else(|| anyhow::anyhow!("No probability found in output"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> LabelDecoder {
        LabelDecoder::from_json(br#"["100-150", "150-200", "200-250", "50-100"]"#).unwrap()
    }

    #[test]
    fn test_label_decoding() {
        let decoder = decoder();
        assert_eq!(decoder.classes().len(), 4);
        assert_eq!(decoder.decode(0).unwrap(), "100-150");
        assert_eq!(decoder.decode(3).unwrap(), "50-100");
    }

    #[test]
    fn test_out_of_range_index() {
        let decoder = decoder();
        assert!(decoder.decode(4).is_err());
        assert!(decoder.decode(-1).is_err());
    }

    #[test]
    fn test_invalid_class_lists_rejected() {
        assert!(LabelDecoder::from_json(b"[]").is_err());
        assert!(LabelDecoder::from_json(br#"["Low", "High", "Low"]"#).is_err());
        assert!(LabelDecoder::from_json(br#"{"classes": 3}"#).is_err());
    }

    #[test]
    fn test_argmax() {
        let scores = vec![(0, 0.1_f32), (1, 0.7), (2, 0.2)];
        assert_eq!(argmax(scores.into_iter()).unwrap(), 1);

        let tied = vec![(0, 0.5_f32), (1, 0.5)];
        assert_eq!(argmax(tied.into_iter()).unwrap(), 0);

        assert!(argmax(std::iter::empty()).is_err());
    }

    #[test]
    fn test_input_shape() {
        let column = InputSpec {
            name: "age".to_string(),
            kind: InputKind::Float32,
            rank: 2,
        };
        assert_eq!(column.shape(), vec![1, 1]);

        let flat = InputSpec { rank: 1, ..column };
        assert_eq!(flat.shape(), vec![1]);
    }

    fn input(name: &str, kind: InputKind) -> InputSpec {
        InputSpec {
            name: name.to_string(),
            kind,
            rank: 2,
        }
    }

    #[test]
    fn test_element_type_mapping() {
        assert_eq!(
            InputKind::from_element_type(TensorElementType::String),
            Some(InputKind::String)
        );
        assert_eq!(
            InputKind::from_element_type(TensorElementType::Float32),
            Some(InputKind::Float32)
        );
        assert_eq!(
            InputKind::from_element_type(TensorElementType::Float64),
            Some(InputKind::Float64)
        );
        assert_eq!(
            InputKind::from_element_type(TensorElementType::Int64),
            Some(InputKind::Int64)
        );
        assert_eq!(
            InputKind::from_element_type(TensorElementType::Int32),
            Some(InputKind::Int32)
        );
        assert_eq!(InputKind::from_element_type(TensorElementType::Bool), None);
    }

    #[test]
    fn test_categorical_value_builds_string_tensor() {
        let zone = input("zone", InputKind::String);

        let value = zone
            .to_value(&EncodedValue::Categorical("Semi-Urban".to_string()))
            .unwrap();
        assert!(matches!(
            value.dtype(),
            ValueType::Tensor {
                ty: TensorElementType::String,
                ..
            }
        ));

        // Numbers in a string column are sent as their text
        let bsi = input("bsi", InputKind::String);
        assert!(bsi.to_value(&EncodedValue::Numeric(1.0)).is_ok());
    }

    #[test]
    fn test_numeric_value_builds_numeric_tensor() {
        let age = input("age", InputKind::Float32);
        let value = age.to_value(&EncodedValue::Numeric(37.0)).unwrap();
        let (shape, data) = value.try_extract_tensor::<f32>().unwrap();
        assert_eq!(shape.len(), 2);
        assert_eq!(data, &[37.0_f32]);

        let zas = input("zas_score", InputKind::Int64);
        let value = zas.to_value(&EncodedValue::Numeric(12.0)).unwrap();
        let (_, data) = value.try_extract_tensor::<i64>().unwrap();
        assert_eq!(data, &[12_i64]);

        let bsi = input("bsi", InputKind::Int32);
        let value = bsi.to_value(&EncodedValue::Numeric(1.0)).unwrap();
        let (_, data) = value.try_extract_tensor::<i32>().unwrap();
        assert_eq!(data, &[1_i32]);
    }

    #[test]
    fn test_text_for_numeric_input_rejected() {
        let age = input("age", InputKind::Float32);
        let err = age
            .to_value(&EncodedValue::Categorical("Urban".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("age"));
    }

    #[test]
    fn test_fractional_value_for_integer_input_rejected() {
        let score = input("cf_ab_score", InputKind::Int64);
        let err = score.to_value(&EncodedValue::Numeric(0.75)).unwrap_err();
        assert!(err.to_string().contains("0.75"));

        let narrow = input("cf_ab_score", InputKind::Int32);
        assert!(narrow.to_value(&EncodedValue::Numeric(0.5)).is_err());
        assert!(narrow.to_value(&EncodedValue::Numeric(1e12)).is_err());
    }

    #[test]
    fn test_class_from_label_tensor() {
        let label = Tensor::from_array((vec![1_i64], vec![2_i64])).unwrap().into_dyn();
        let probability = Tensor::from_array((vec![1_i64, 3], vec![0.9_f32, 0.05, 0.05]))
            .unwrap()
            .into_dyn();

        // The label output wins over the probabilities
        assert_eq!(class_from_outputs(Some(&label), Some(&probability)).unwrap(), 2);
    }

    #[test]
    fn test_class_from_probability_tensor() {
        let probability = Tensor::from_array((vec![1_i64, 3], vec![0.1_f32, 0.7, 0.2]))
            .unwrap()
            .into_dyn();
        assert_eq!(class_from_outputs(None, Some(&probability)).unwrap(), 1);

        // A label output that is not an int64 tensor falls through
        let odd_label = Tensor::from_array((vec![1_i64], vec![2.0_f32])).unwrap().into_dyn();
        assert_eq!(
            class_from_outputs(Some(&odd_label), Some(&probability)).unwrap(),
            1
        );
    }

    #[test]
    fn test_no_usable_output() {
        assert!(class_from_outputs(None, None).is_err());

        let label = Tensor::from_array((vec![1_i64], vec![2.0_f32])).unwrap().into_dyn();
        assert!(class_from_outputs(Some(&label), None).is_err());
    }

    #[test]
    fn test_poisoned_session_lock_recovers() {
        let session = Mutex::new(0_u32);
        let _ = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = session.lock().unwrap();
                panic!("run aborted");
            })
            .join()
        });
        assert!(session.is_poisoned());

        *lock_session(&session) += 1;
        assert_eq!(*lock_session(&session), 1);
    }
}
