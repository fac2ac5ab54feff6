#![forbid(unsafe_code)]

use std::fmt;
use std::hash::{Hash, Hasher};

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F64,
    I32,
    I64,
    Bool,
}

/// Accepted spellings, matched exactly. Casing variants are listed explicitly;
/// an unlisted casing is rejected even when another casing of it is present.
const DTYPE_SYNONYMS: &[(&str, DType)] = &[
    ("float32", DType::F32),
    ("Float32", DType::F32),
    ("float", DType::F32),
    ("float64", DType::F64),
    ("Float64", DType::F64),
    ("double", DType::F64),
    ("int32", DType::I32),
    ("Int32", DType::I32),
    ("int", DType::I32),
    ("int64", DType::I64),
    ("Int64", DType::I64),
    ("long", DType::I64),
    ("bool", DType::Bool),
    ("Bool", DType::Bool),
];

impl DType {
    #[must_use]
    pub const fn all() -> &'static [DType] {
        &[DType::F32, DType::F64, DType::I32, DType::I64, DType::Bool]
    }

    pub fn from_name(name: &str) -> Result<Self, DTypeError> {
        DTYPE_SYNONYMS
            .iter()
            .find(|(spelling, _)| *spelling == name)
            .map(|(_, dtype)| *dtype)
            .ok_or_else(|| DTypeError::Unknown {
                name: name.to_string(),
            })
    }

    /// The spelling used when a resolved dtype is written back out.
    #[must_use]
    pub const fn canonical_name(self) -> &'static str {
        match self {
            Self::F32 => "float32",
            Self::F64 => "float64",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::Bool => "bool",
        }
    }

    #[must_use]
    pub const fn is_floating_point(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Rounds `value` to what an element of this dtype can hold.
    #[must_use]
    pub fn cast(self, value: f64) -> f64 {
        match self {
            Self::F64 => value,
            Self::F32 => f64::from(value as f32),
            Self::I32 => f64::from(value as i32),
            Self::I64 => (value as i64) as f64,
            Self::Bool => {
                if value != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DTypeError {
    Unknown { name: String },
}

impl fmt::Display for DTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown { name } => write!(f, "Unknown scalar type: {name}"),
        }
    }
}

impl std::error::Error for DTypeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorMeta {
    shape: Vec<usize>,
    strides: Vec<usize>,
    dtype: DType,
    device: Device,
}

impl TensorMeta {
    /// Contiguous metadata for `shape`. Fails when the element count does not
    /// fit in `usize`.
    pub fn from_shape(
        shape: Vec<usize>,
        dtype: DType,
        device: Device,
    ) -> Result<Self, TensorMetaError> {
        checked_numel(&shape)?;
        let strides = contiguous_strides(&shape);
        Ok(Self {
            shape,
            strides,
            dtype,
            device,
        })
    }

    /// Same shape and strides, different dtype/device.
    #[must_use]
    pub fn with_options(&self, dtype: DType, device: Device) -> Self {
        Self {
            shape: self.shape.clone(),
            strides: self.strides.clone(),
            dtype,
            device,
        }
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn device(&self) -> Device {
        self.device
    }

    #[must_use]
    pub fn numel(&self) -> usize {
        self.shape.iter().copied().product()
    }

    #[must_use]
    pub fn fingerprint64(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.shape.hash(&mut hasher);
        self.strides.hash(&mut hasher);
        self.dtype.hash(&mut hasher);
        self.device.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TensorMetaError {
    NumelOverflow { shape: Vec<usize> },
}

impl fmt::Display for TensorMetaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NumelOverflow { shape } => {
                write!(f, "element count overflows for shape {shape:?}")
            }
        }
    }
}

impl std::error::Error for TensorMetaError {}

pub fn checked_numel(shape: &[usize]) -> Result<usize, TensorMetaError> {
    shape
        .iter()
        .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
        .ok_or_else(|| TensorMetaError::NumelOverflow {
            shape: shape.to_vec(),
        })
}

#[must_use]
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    if shape.is_empty() {
        return Vec::new();
    }

    let mut strides = vec![1; shape.len()];
    let mut running = 1usize;
    for idx in (0..shape.len()).rev() {
        strides[idx] = running;
        running = running.saturating_mul(shape[idx]);
    }
    strides
}
