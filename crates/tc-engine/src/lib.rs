#![forbid(unsafe_code)]

use std::fmt;

use tc_core::{DType, Device, TensorMeta};
use tc_device::AcceleratorProbe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorOptions {
    pub dtype: DType,
    pub device: Device,
    pub requires_grad: bool,
}

impl Default for TensorOptions {
    fn default() -> Self {
        Self {
            dtype: DType::F32,
            device: Device::Cpu,
            requires_grad: false,
        }
    }
}

/// How a `*_like` tensor is initialised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LikeInit {
    Empty,
    Zeros,
    Ones,
    Full(f64),
    /// Uniform on `[0, 1)`.
    Uniform,
    /// Standard normal.
    Normal,
    /// Integers on `[low, high)`.
    RandInt { low: i64, high: i64 },
}

impl LikeInit {
    #[must_use]
    pub const fn op_name(self) -> &'static str {
        match self {
            Self::Empty => "empty_like",
            Self::Zeros => "zeros_like",
            Self::Ones => "ones_like",
            Self::Full(_) => "full_like",
            Self::Uniform => "rand_like",
            Self::Normal => "randn_like",
            Self::RandInt { .. } => "randint_like",
        }
    }
}

/// Unset dtype and device are taken from the source tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LikeOptions {
    pub dtype: Option<DType>,
    pub device: Option<Device>,
    pub requires_grad: bool,
    pub init: LikeInit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub op: &'static str,
    pub reason: String,
}

impl EngineError {
    fn new(op: &'static str, reason: impl Into<String>) -> Self {
        Self {
            op,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.op, self.reason)
    }
}

impl std::error::Error for EngineError {}

/// Tensor construction backend driven by the command layer.
///
/// Sizes arrive unvalidated (`i64`); the engine owns every range and sign
/// check and reports them as [`EngineError`].
pub trait TensorEngine: AcceleratorProbe {
    type Tensor;

    /// Uninitialised contents.
    fn create(&mut self, shape: &[i64], options: TensorOptions)
    -> Result<Self::Tensor, EngineError>;

    fn fill(
        &mut self,
        shape: &[i64],
        value: f64,
        options: TensorOptions,
    ) -> Result<Self::Tensor, EngineError>;

    /// `n x m` matrix with ones on the main diagonal.
    fn identity(
        &mut self,
        n: i64,
        m: i64,
        options: TensorOptions,
    ) -> Result<Self::Tensor, EngineError>;

    /// Half-open `[start, end)` stepped by `step`.
    fn range(
        &mut self,
        start: f64,
        end: f64,
        step: f64,
        options: TensorOptions,
    ) -> Result<Self::Tensor, EngineError>;

    /// `steps` evenly spaced values from `start` to `end` inclusive.
    fn range_linear(
        &mut self,
        start: f64,
        end: f64,
        steps: i64,
        options: TensorOptions,
    ) -> Result<Self::Tensor, EngineError>;

    /// `base` raised to each of `range_linear(start, end, steps)`.
    fn range_log(
        &mut self,
        start: f64,
        end: f64,
        steps: i64,
        base: f64,
        options: TensorOptions,
    ) -> Result<Self::Tensor, EngineError>;

    fn like(
        &mut self,
        source: &Self::Tensor,
        options: LikeOptions,
    ) -> Result<Self::Tensor, EngineError>;

    fn meta<'a>(&self, tensor: &'a Self::Tensor) -> &'a TensorMeta;

    fn requires_grad(&self, tensor: &Self::Tensor) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostTensor {
    meta: TensorMeta,
    values: Vec<f64>,
    requires_grad: bool,
}

impl HostTensor {
    #[must_use]
    pub fn meta(&self) -> &TensorMeta {
        &self.meta
    }

    /// Contiguous values, already cast to the tensor's dtype.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }
}

pub const DEFAULT_SEED: u64 = 0x5eed_7c1d_2024_0001;
pub const DEFAULT_ELEMENT_LIMIT: usize = 1 << 24;

/// splitmix64; deterministic for a given seed.
#[derive(Debug, Clone)]
struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform on `[0, 1)` with 53 bits of precision.
    fn next_unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform on `[0, 1)` with 24 bits, exact in `float32`.
    fn next_unit_single(&mut self) -> f64 {
        (self.next_u64() >> 40) as f64 * (1.0 / (1u64 << 24) as f64)
    }

    fn next_normal(&mut self) -> f64 {
        // Box-Muller; 1 - u keeps the log argument in (0, 1].
        let u1 = 1.0 - self.next_unit();
        let u2 = self.next_unit();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    fn next_below(&mut self, span: u64) -> u64 {
        ((u128::from(self.next_u64()) * u128::from(span)) >> 64) as u64
    }
}

/// Reference engine keeping every tensor in host memory as `f64`.
///
/// Tensors placed on `cuda` are only tagged with that device; this engine
/// never hands out accelerator memory.
#[derive(Debug, Clone)]
pub struct HostEngine {
    accelerator_available: bool,
    element_limit: usize,
    rng: SplitMix64,
}

impl Default for HostEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl HostEngine {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            accelerator_available: false,
            element_limit: DEFAULT_ELEMENT_LIMIT,
            rng: SplitMix64::new(seed),
        }
    }

    #[must_use]
    pub fn with_accelerator(mut self, available: bool) -> Self {
        self.accelerator_available = available;
        self
    }

    #[must_use]
    pub fn with_element_limit(mut self, limit: usize) -> Self {
        self.element_limit = limit;
        self
    }

    fn checked_meta(
        &self,
        op: &'static str,
        shape: &[i64],
        dtype: DType,
        device: Device,
    ) -> Result<TensorMeta, EngineError> {
        let dims = shape
            .iter()
            .map(|dim| {
                usize::try_from(*dim).map_err(|_| {
                    EngineError::new(op, format!("negative dimension {dim} in shape {shape:?}"))
                })
            })
            .collect::<Result<Vec<usize>, EngineError>>()?;
        let meta = TensorMeta::from_shape(dims, dtype, device)
            .map_err(|error| EngineError::new(op, error.to_string()))?;
        self.check_limit(op, meta.numel())?;
        Ok(meta)
    }

    fn check_limit(&self, op: &'static str, numel: usize) -> Result<(), EngineError> {
        if numel > self.element_limit {
            return Err(EngineError::new(
                op,
                format!(
                    "{numel} elements exceed the host engine limit of {}",
                    self.element_limit
                ),
            ));
        }
        Ok(())
    }

    fn build(meta: TensorMeta, values: Vec<f64>, requires_grad: bool) -> HostTensor {
        let dtype = meta.dtype();
        HostTensor {
            meta,
            values: values.into_iter().map(|value| dtype.cast(value)).collect(),
            requires_grad,
        }
    }

    fn vector(
        &self,
        op: &'static str,
        values: Vec<f64>,
        options: TensorOptions,
    ) -> Result<HostTensor, EngineError> {
        if options.dtype == DType::Bool {
            return Err(EngineError::new(op, "not implemented for 'bool'"));
        }
        let meta = self.checked_meta(op, &[values.len() as i64], options.dtype, options.device)?;
        Ok(Self::build(meta, values, options.requires_grad))
    }

    fn linear_points(
        &self,
        op: &'static str,
        start: f64,
        end: f64,
        steps: i64,
    ) -> Result<Vec<f64>, EngineError> {
        let count = usize::try_from(steps)
            .map_err(|_| EngineError::new(op, "number of steps must be non-negative"))?;
        self.check_limit(op, count)?;
        Ok(match count {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let delta = (end - start) / (count - 1) as f64;
                (0..count)
                    .map(|idx| {
                        if idx == count - 1 {
                            end
                        } else {
                            start + delta * idx as f64
                        }
                    })
                    .collect()
            }
        })
    }
}

impl AcceleratorProbe for HostEngine {
    fn accelerator_available(&self) -> bool {
        self.accelerator_available
    }
}

impl TensorEngine for HostEngine {
    type Tensor = HostTensor;

    fn create(&mut self, shape: &[i64], options: TensorOptions) -> Result<HostTensor, EngineError> {
        let meta = self.checked_meta("empty", shape, options.dtype, options.device)?;
        let values = vec![0.0; meta.numel()];
        Ok(Self::build(meta, values, options.requires_grad))
    }

    fn fill(
        &mut self,
        shape: &[i64],
        value: f64,
        options: TensorOptions,
    ) -> Result<HostTensor, EngineError> {
        let meta = self.checked_meta("full", shape, options.dtype, options.device)?;
        let values = vec![value; meta.numel()];
        Ok(Self::build(meta, values, options.requires_grad))
    }

    fn identity(
        &mut self,
        n: i64,
        m: i64,
        options: TensorOptions,
    ) -> Result<HostTensor, EngineError> {
        if n < 0 || m < 0 {
            return Err(EngineError::new(
                "eye",
                format!("n and m must be non-negative, got n={n}, m={m}"),
            ));
        }
        let meta = self.checked_meta("eye", &[n, m], options.dtype, options.device)?;
        let mut values = vec![0.0; meta.numel()];
        let diagonal_stride: usize = meta.strides().iter().sum();
        let diagonal = meta.shape().iter().copied().min().unwrap_or(0);
        for idx in 0..diagonal {
            values[idx * diagonal_stride] = 1.0;
        }
        Ok(Self::build(meta, values, options.requires_grad))
    }

    fn range(
        &mut self,
        start: f64,
        end: f64,
        step: f64,
        options: TensorOptions,
    ) -> Result<HostTensor, EngineError> {
        const OP: &str = "arange";
        if !(start.is_finite() && end.is_finite()) {
            return Err(EngineError::new(OP, "unsupported range: bounds must be finite"));
        }
        if step == 0.0 || !step.is_finite() {
            return Err(EngineError::new(OP, "step must be nonzero and finite"));
        }
        if (step > 0.0 && end < start) || (step < 0.0 && end > start) {
            return Err(EngineError::new(
                OP,
                format!("upper bound and larger bound inconsistent with step sign: start={start}, end={end}, step={step}"),
            ));
        }
        let span = ((end - start) / step).ceil();
        if span > self.element_limit as f64 {
            return Err(EngineError::new(
                OP,
                format!("range of {span} elements exceeds the host engine limit"),
            ));
        }
        let count = span as usize;
        let values = (0..count).map(|idx| start + step * idx as f64).collect();
        self.vector(OP, values, options)
    }

    fn range_linear(
        &mut self,
        start: f64,
        end: f64,
        steps: i64,
        options: TensorOptions,
    ) -> Result<HostTensor, EngineError> {
        let values = self.linear_points("linspace", start, end, steps)?;
        self.vector("linspace", values, options)
    }

    fn range_log(
        &mut self,
        start: f64,
        end: f64,
        steps: i64,
        base: f64,
        options: TensorOptions,
    ) -> Result<HostTensor, EngineError> {
        let values = self
            .linear_points("logspace", start, end, steps)?
            .into_iter()
            .map(|exponent| base.powf(exponent))
            .collect();
        self.vector("logspace", values, options)
    }

    fn like(&mut self, source: &HostTensor, options: LikeOptions) -> Result<HostTensor, EngineError> {
        let op = options.init.op_name();
        let dtype = options.dtype.unwrap_or(source.meta.dtype());
        let device = options.device.unwrap_or(source.meta.device());
        let meta = source.meta.with_options(dtype, device);
        let numel = meta.numel();

        let values = match options.init {
            LikeInit::Empty | LikeInit::Zeros => vec![0.0; numel],
            LikeInit::Ones => vec![1.0; numel],
            LikeInit::Full(value) => vec![value; numel],
            LikeInit::Uniform | LikeInit::Normal => {
                if !dtype.is_floating_point() {
                    return Err(EngineError::new(
                        op,
                        format!("not implemented for '{}'", dtype.canonical_name()),
                    ));
                }
                if options.init == LikeInit::Uniform && dtype == DType::F32 {
                    (0..numel).map(|_| self.rng.next_unit_single()).collect()
                } else if options.init == LikeInit::Uniform {
                    (0..numel).map(|_| self.rng.next_unit()).collect()
                } else {
                    (0..numel).map(|_| self.rng.next_normal()).collect()
                }
            }
            LikeInit::RandInt { low, high } => {
                if dtype == DType::Bool {
                    return Err(EngineError::new(op, "not implemented for 'bool'"));
                }
                if high <= low {
                    return Err(EngineError::new(
                        op,
                        format!("random_ expects 'from' to be less than 'to', but got from={low} >= to={high}"),
                    ));
                }
                let span = high.abs_diff(low);
                (0..numel)
                    .map(|_| low.wrapping_add(self.rng.next_below(span) as i64) as f64)
                    .collect()
            }
        };
        Ok(Self::build(meta, values, options.requires_grad))
    }

    fn meta<'a>(&self, tensor: &'a HostTensor) -> &'a TensorMeta {
        &tensor.meta
    }

    fn requires_grad(&self, tensor: &HostTensor) -> bool {
        tensor.requires_grad
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tc_core::{DType, Device};
    use tc_device::AcceleratorProbe;

    use super::{HostEngine, LikeInit, LikeOptions, TensorEngine, TensorOptions};

    fn opts(dtype: DType) -> TensorOptions {
        TensorOptions {
            dtype,
            ..TensorOptions::default()
        }
    }

    fn like(init: LikeInit) -> LikeOptions {
        LikeOptions {
            dtype: None,
            device: None,
            requires_grad: false,
            init,
        }
    }

    #[test]
    fn fill_casts_to_dtype() {
        let mut engine = HostEngine::default();
        let tensor = engine
            .fill(&[2, 2], 2.75, opts(DType::I32))
            .expect("fill should succeed");
        assert_eq!(tensor.meta().shape(), &[2, 2]);
        assert_eq!(tensor.values(), &[2.0, 2.0, 2.0, 2.0]);

        let flags = engine
            .fill(&[3], 5.0, opts(DType::Bool))
            .expect("bool fill should succeed");
        assert_eq!(flags.values(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn create_accepts_empty_and_scalar_shapes() {
        let mut engine = HostEngine::default();
        let scalar = engine
            .create(&[], TensorOptions::default())
            .expect("scalar shape should succeed");
        assert_eq!(scalar.meta().numel(), 1);
        let hollow = engine
            .create(&[0, 3], TensorOptions::default())
            .expect("zero-sized shape should succeed");
        assert!(hollow.values().is_empty());
    }

    #[test]
    fn negative_dimensions_are_rejected() {
        let mut engine = HostEngine::default();
        let err = engine
            .fill(&[2, -1], 0.0, TensorOptions::default())
            .expect_err("negative dims must fail");
        assert_eq!(err.op, "full");
        assert!(err.reason.contains("negative dimension -1"));
    }

    #[test]
    fn element_limit_is_enforced() {
        let mut engine = HostEngine::default().with_element_limit(10);
        let err = engine
            .create(&[4, 4], TensorOptions::default())
            .expect_err("over-limit tensors must fail");
        assert!(err.reason.contains("exceed"));
        let overflow = engine
            .create(&[i64::MAX, i64::MAX], TensorOptions::default())
            .expect_err("overflowing numel must fail");
        assert!(overflow.reason.contains("overflow"));
    }

    #[test]
    fn identity_places_ones_on_diagonal() {
        let mut engine = HostEngine::default();
        let eye = engine
            .identity(2, 3, TensorOptions::default())
            .expect("eye should succeed");
        assert_eq!(eye.meta().shape(), &[2, 3]);
        assert_eq!(eye.values(), &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);

        let tall = engine
            .identity(3, 2, TensorOptions::default())
            .expect("tall eye should succeed");
        assert_eq!(tall.values(), &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

        let empty = engine
            .identity(0, 4, TensorOptions::default())
            .expect("empty eye should succeed");
        assert!(empty.values().is_empty());
        assert!(engine.identity(-1, 2, TensorOptions::default()).is_err());
    }

    #[test]
    fn range_is_half_open() {
        let mut engine = HostEngine::default();
        let tensor = engine
            .range(0.0, 10.0, 3.0, opts(DType::I64))
            .expect("arange should succeed");
        assert_eq!(tensor.values(), &[0.0, 3.0, 6.0, 9.0]);

        let descending = engine
            .range(5.0, -5.0, -2.5, opts(DType::F64))
            .expect("descending arange should succeed");
        assert_eq!(descending.values(), &[5.0, 2.5, 0.0, -2.5]);
    }

    #[test]
    fn range_rejects_bad_steps() {
        let mut engine = HostEngine::default();
        assert!(engine.range(0.0, 5.0, 0.0, TensorOptions::default()).is_err());
        assert!(engine.range(0.0, 5.0, -1.0, TensorOptions::default()).is_err());
        assert!(engine.range(0.0, 5.0, 1.0, opts(DType::Bool)).is_err());
    }

    #[test]
    fn linspace_hits_both_endpoints() {
        let mut engine = HostEngine::default();
        let tensor = engine
            .range_linear(0.0, 1.0, 5, opts(DType::F64))
            .expect("linspace should succeed");
        assert_eq!(tensor.values(), &[0.0, 0.25, 0.5, 0.75, 1.0]);
        assert!(engine.range_linear(0.0, 1.0, -1, TensorOptions::default()).is_err());
        let empty = engine
            .range_linear(0.0, 1.0, 0, TensorOptions::default())
            .expect("zero steps should succeed");
        assert!(empty.values().is_empty());
    }

    #[test]
    fn logspace_raises_base() {
        let mut engine = HostEngine::default();
        let tensor = engine
            .range_log(0.0, 3.0, 4, 10.0, opts(DType::F64))
            .expect("logspace should succeed");
        assert_eq!(tensor.values(), &[1.0, 10.0, 100.0, 1000.0]);
    }

    #[test]
    fn like_inherits_unless_overridden() {
        let mut engine = HostEngine::default().with_accelerator(true);
        let source = engine
            .fill(
                &[2, 3],
                4.0,
                TensorOptions {
                    dtype: DType::F64,
                    device: Device::Cuda,
                    requires_grad: true,
                },
            )
            .expect("source should succeed");

        let inherited = engine
            .like(&source, like(LikeInit::Ones))
            .expect("ones_like should succeed");
        assert_eq!(inherited.meta().shape(), &[2, 3]);
        assert_eq!(inherited.meta().dtype(), DType::F64);
        assert_eq!(inherited.meta().device(), Device::Cuda);
        assert!(!inherited.requires_grad());
        assert!(inherited.values().iter().all(|value| *value == 1.0));

        let overridden = engine
            .like(
                &source,
                LikeOptions {
                    dtype: Some(DType::I32),
                    device: Some(Device::Cpu),
                    requires_grad: true,
                    init: LikeInit::Full(7.9),
                },
            )
            .expect("full_like should succeed");
        assert_eq!(overridden.meta().dtype(), DType::I32);
        assert_eq!(overridden.meta().device(), Device::Cpu);
        assert!(overridden.requires_grad());
        assert!(overridden.values().iter().all(|value| *value == 7.0));
    }

    #[test]
    fn random_like_is_seeded_and_bounded() {
        let mut first = HostEngine::new(7);
        let mut second = HostEngine::new(7);
        let source = first
            .create(&[64], opts(DType::F32))
            .expect("source should succeed");

        let a = first
            .like(&source, like(LikeInit::Uniform))
            .expect("rand_like should succeed");
        let b = second
            .like(&source, like(LikeInit::Uniform))
            .expect("rand_like should succeed");
        assert_eq!(a.values(), b.values());
        assert!(a.values().iter().all(|value| (0.0..1.0).contains(value)));

        let ints = first
            .like(
                &source,
                LikeOptions {
                    dtype: Some(DType::I64),
                    ..like(LikeInit::RandInt { low: -3, high: 4 })
                },
            )
            .expect("randint_like should succeed");
        assert!(ints.values().iter().all(|value| (-3.0..4.0).contains(value)));
    }

    #[test]
    fn random_like_rejects_unsupported_inputs() {
        let mut engine = HostEngine::default();
        let ints = engine
            .create(&[4], opts(DType::I64))
            .expect("source should succeed");
        let err = engine
            .like(&ints, like(LikeInit::Normal))
            .expect_err("randn_like on int64 must fail");
        assert_eq!(err.op, "randn_like");

        let err = engine
            .like(&ints, like(LikeInit::RandInt { low: 3, high: 3 }))
            .expect_err("empty randint range must fail");
        assert_eq!(err.op, "randint_like");
    }

    #[test]
    fn probe_reflects_configuration() {
        assert!(!HostEngine::default().accelerator_available());
        assert!(HostEngine::default().with_accelerator(true).accelerator_available());
    }

    proptest! {
        #[test]
        fn prop_arange_length_matches_ceil(start in -50i32..50, span in 0i32..200, step in 1i32..7) {
            let mut engine = HostEngine::default();
            let end = start + span;
            let tensor = engine
                .range(f64::from(start), f64::from(end), f64::from(step), opts(DType::F64))
                .expect("arange should succeed");
            let expected = (span + step - 1) / step;
            prop_assert_eq!(tensor.values().len(), expected as usize);
            prop_assert!(tensor.values().iter().all(|value| *value < f64::from(end)));
        }

        #[test]
        fn prop_linspace_has_requested_length(start in -1e3f64..1e3, end in -1e3f64..1e3, steps in 2i64..64) {
            let mut engine = HostEngine::default();
            let tensor = engine
                .range_linear(start, end, steps, opts(DType::F64))
                .expect("linspace should succeed");
            prop_assert_eq!(tensor.values().len(), steps as usize);
            prop_assert_eq!(tensor.values()[0], start);
            prop_assert_eq!(tensor.values()[steps as usize - 1], end);
        }
    }
}
