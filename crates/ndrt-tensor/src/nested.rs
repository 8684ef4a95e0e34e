//! Conversion between tensors and nested host values.

use crate::{device::Device, error::TensorError, tensor::Tensor};

/// A dynamically typed value as handed over by a host environment.
///
/// Lists nest to describe n-dimensional data. Integer, float and boolean
/// leaves are numeric; booleans convert to `1.0` and `0.0`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(untagged)
)]
pub enum HostValue {
    /// Absence of a value.
    Null,
    /// A boolean leaf.
    Bool(bool),
    /// An integer leaf.
    Int(i64),
    /// A floating point leaf.
    Float(f64),
    /// A string leaf, never numeric.
    Str(String),
    /// A nested list.
    List(Vec<HostValue>),
}

impl HostValue {
    fn as_number(&self) -> Result<f32, TensorError> {
        match self {
            HostValue::Int(v) => Ok(*v as f32),
            HostValue::Float(v) => Ok(*v as f32),
            HostValue::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            HostValue::Null => Err(TensorError::Type("null is not a numeric value".to_string())),
            HostValue::Str(s) => Err(TensorError::Type(format!(
                "string {:?} is not a numeric value",
                s
            ))),
            HostValue::List(_) => Err(TensorError::Type("expected a numeric leaf".to_string())),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Float(_) => "float",
            HostValue::Str(_) => "string",
            HostValue::List(_) => "list",
        }
    }
}

impl From<f32> for HostValue {
    fn from(v: f32) -> Self {
        HostValue::Float(v as f64)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        HostValue::Float(v)
    }
}

impl From<i64> for HostValue {
    fn from(v: i64) -> Self {
        HostValue::Int(v)
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        HostValue::Bool(v)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(v: Vec<T>) -> Self {
        HostValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Infers the shape by following the first element at each depth.
fn infer_shape(value: &HostValue) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut node = value;
    while let HostValue::List(items) = node {
        shape.push(items.len());
        match items.first() {
            Some(first) => node = first,
            None => break,
        }
    }
    shape
}

fn flatten_into(
    value: &HostValue,
    shape: &[usize],
    depth: usize,
    out: &mut Vec<f32>,
) -> Result<(), TensorError> {
    match value {
        HostValue::List(items) => {
            let Some(&expected) = shape.get(depth) else {
                return Err(TensorError::Shape(format!(
                    "ragged input: unexpected list at depth {}",
                    depth
                )));
            };
            if items.len() != expected {
                return Err(TensorError::Shape(format!(
                    "ragged input: expected {} entries at depth {}, got {}",
                    expected,
                    depth,
                    items.len()
                )));
            }
            for item in items {
                flatten_into(item, shape, depth + 1, out)?;
            }
            Ok(())
        }
        leaf => {
            let number = leaf.as_number()?;
            if depth != shape.len() {
                return Err(TensorError::Shape(format!(
                    "ragged input: {} leaf at depth {} in data of rank {}",
                    leaf.type_name(),
                    depth,
                    shape.len()
                )));
            }
            out.push(number);
            Ok(())
        }
    }
}

impl Tensor {
    /// Builds a tensor from a nested host value.
    ///
    /// A bare numeric leaf gives a scalar tensor and `[]` gives shape `[0]`.
    ///
    /// # Errors
    ///
    /// - [`TensorError::Type`] if a leaf is not numeric
    /// - [`TensorError::Shape`] if the nesting is ragged
    pub fn from_nested(value: &HostValue, device: Device) -> Result<Tensor, TensorError> {
        let shape = infer_shape(value);
        let mut data = Vec::with_capacity(crate::layout::numel(&shape));
        flatten_into(value, &shape, 0, &mut data)?;
        Tensor::from_slice(&shape, &data, device)
    }

    /// Converts the tensor into nested host lists.
    ///
    /// A scalar tensor gives a bare float.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::DeviceMismatch`] if the tensor is not on the CPU.
    pub fn to_nested(&self) -> Result<HostValue, TensorError> {
        if !self.device().is_cpu() {
            return Err(TensorError::DeviceMismatch {
                expected: Device::Cpu,
                actual: self.device(),
            });
        }
        let data = self.to_vec()?;
        if self.is_scalar() {
            return Ok(HostValue::from(data.first().copied().unwrap_or_default()));
        }
        Ok(build_nested(&data, self.shape()))
    }
}

fn build_nested(data: &[f32], shape: &[usize]) -> HostValue {
    match shape {
        [] => HostValue::from(data.first().copied().unwrap_or_default()),
        [_] => HostValue::List(data.iter().map(|&v| HostValue::from(v)).collect()),
        [n, rest @ ..] => {
            let chunk = crate::layout::numel(rest);
            let items = (0..*n)
                .map(|i| build_nested(&data[i * chunk..(i + 1) * chunk], rest))
                .collect();
            HostValue::List(items)
        }
    }
}
