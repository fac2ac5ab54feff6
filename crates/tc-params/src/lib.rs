#![forbid(unsafe_code)]

//! Parameter resolution for tensor-creation commands.
//!
//! A command invocation is a flat token sequence in one of three syntaxes:
//!
//! - positional: `zeros [2,3] float64 cpu 1`
//! - named: `zeros -shape [2,3] -requiresGrad true`
//! - hybrid: a fixed positional prefix, then named pairs: `zeros [2,3] -dtype int64`
//!
//! [`classify`] picks the syntax from the token shapes alone. [`resolve`] walks
//! the tokens against a static [`ParameterSchema`] and yields a
//! [`ResolvedParameters`] record or the first [`ResolutionError`] hit.

use std::collections::BTreeMap;
use std::fmt;

use tc_core::{DType, Device};
use tc_device::{AcceleratorProbe, DeviceResolution, resolve_device};

pub const OPTION_MARKER: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxForm {
    Positional,
    Named,
    Hybrid,
}

impl SyntaxForm {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Positional => "positional",
            Self::Named => "named",
            Self::Hybrid => "hybrid",
        }
    }
}

/// A token names a parameter when it is the marker followed by a letter.
/// Negative numbers (`-1`, `-2.5`, `-inf`) stay values.
#[must_use]
pub fn is_option_token(token: &str) -> bool {
    let Some(rest) = token.strip_prefix(OPTION_MARKER) else {
        return false;
    };
    rest.starts_with(|c: char| c.is_ascii_alphabetic()) && parse_number(token).is_none()
}

fn option_name(token: &str) -> Option<&str> {
    if is_option_token(token) {
        token.strip_prefix(OPTION_MARKER)
    } else {
        None
    }
}

fn strip_marker(token: &str) -> &str {
    option_name(token).unwrap_or(token)
}

#[must_use]
pub fn classify<S: AsRef<str>>(tokens: &[S]) -> SyntaxForm {
    let Some((first, rest)) = tokens.split_first() else {
        return SyntaxForm::Positional;
    };
    if is_option_token(first.as_ref()) {
        SyntaxForm::Named
    } else if rest.iter().any(|token| is_option_token(token.as_ref())) {
        SyntaxForm::Hybrid
    } else {
        SyntaxForm::Positional
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    Unbalanced { token: String },
    InvalidDimension { element: String },
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbalanced { token } => write!(f, "expected list but got \"{token}\""),
            Self::InvalidDimension { element } => {
                write!(f, "Invalid integer in shape list: \"{element}\"")
            }
        }
    }
}

impl std::error::Error for ShapeError {}

/// Decodes a list token into dimension sizes.
///
/// Accepts bracketed lists (`[2,3]`, `[2, 3]`, `[2 3]`), braced lists
/// (`{2 3}`) and bare whitespace lists (`2 3`, `5`). Sign is not checked here.
pub fn decode_shape(token: &str) -> Result<Vec<i64>, ShapeError> {
    let trimmed = token.trim();
    let inner = match (trimmed.chars().next(), trimmed.chars().last()) {
        (Some('['), Some(']')) | (Some('{'), Some('}')) if trimmed.len() >= 2 => {
            &trimmed[1..trimmed.len() - 1]
        }
        (Some('[' | '{'), _) | (_, Some(']' | '}')) => {
            return Err(ShapeError::Unbalanced {
                token: token.to_string(),
            });
        }
        _ => trimmed,
    };

    let elements: Vec<&str> = if inner.contains(',') {
        inner.split(',').map(str::trim).collect()
    } else {
        inner.split_whitespace().collect()
    };

    elements
        .into_iter()
        .map(|element| {
            element
                .parse::<i64>()
                .map_err(|_| ShapeError::InvalidDimension {
                    element: element.to_string(),
                })
        })
        .collect()
}

#[must_use]
pub fn encode_shape(shape: &[i64]) -> String {
    let dims: Vec<String> = shape.iter().map(i64::to_string).collect();
    format!("[{}]", dims.join(","))
}

fn parse_integer(token: &str) -> Option<i64> {
    token.trim().parse().ok()
}

/// Infinities are numbers; NaN is not.
fn parse_number(token: &str) -> Option<f64> {
    token
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| !value.is_nan())
}

fn parse_boolean(token: &str) -> Option<bool> {
    match token {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Shape,
    DType,
    Device,
    Boolean,
    Number,
    Integer,
    String,
}

impl ParamKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Shape => "list-of-integer",
            Self::DType => "dtype",
            Self::Device => "device",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::String => "string",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumKind {
    DType,
    Device,
}


/// Every logical parameter any command accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamKey {
    Shape,
    Input,
    N,
    M,
    Start,
    End,
    Step,
    Steps,
    Base,
    Value,
    Low,
    High,
    DType,
    Device,
    RequiresGrad,
}

impl ParamKey {
    #[must_use]
    pub const fn all() -> &'static [ParamKey] {
        &[
            ParamKey::Shape,
            ParamKey::Input,
            ParamKey::N,
            ParamKey::M,
            ParamKey::Start,
            ParamKey::End,
            ParamKey::Step,
            ParamKey::Steps,
            ParamKey::Base,
            ParamKey::Value,
            ParamKey::Low,
            ParamKey::High,
            ParamKey::DType,
            ParamKey::Device,
            ParamKey::RequiresGrad,
        ]
    }

    /// Name as written after the option marker.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Shape => "shape",
            Self::Input => "input",
            Self::N => "n",
            Self::M => "m",
            Self::Start => "start",
            Self::End => "end",
            Self::Step => "step",
            Self::Steps => "steps",
            Self::Base => "base",
            Self::Value => "value",
            Self::Low => "low",
            Self::High => "high",
            Self::DType => "dtype",
            Self::Device => "device",
            Self::RequiresGrad => "requiresGrad",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|key| key.name() == name)
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Shape(Vec<i64>),
    DType(DType),
    Device(Device),
    Boolean(bool),
    Number(f64),
    Integer(i64),
    String(String),
}

impl ParamValue {
    /// Token that coerces back to this value.
    #[must_use]
    pub fn to_token(&self) -> String {
        match self {
            Self::Shape(shape) => encode_shape(shape),
            Self::DType(dtype) => dtype.canonical_name().to_string(),
            Self::Device(device) => device.name().to_string(),
            Self::Boolean(flag) => flag.to_string(),
            Self::Number(value) => value.to_string(),
            Self::Integer(value) => value.to_string(),
            Self::String(value) => value.clone(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDefault {
    None,
    Boolean(bool),
    Number(f64),
    Integer(i64),
    DType(DType),
    Device(Device),
    /// Copies another parameter's resolved value.
    SameAs(ParamKey),
}

impl ParamDefault {
    fn value(self) -> Option<ParamValue> {
        match self {
            Self::None | Self::SameAs(_) => None,
            Self::Boolean(flag) => Some(ParamValue::Boolean(flag)),
            Self::Number(value) => Some(ParamValue::Number(value)),
            Self::Integer(value) => Some(ParamValue::Integer(value)),
            Self::DType(dtype) => Some(ParamValue::DType(dtype)),
            Self::Device(device) => Some(ParamValue::Device(device)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionalSlot {
    Fixed,
    /// Skipped when the token does not coerce; the token moves to the next slot.
    Elidable,
    NamedOnly,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub key: ParamKey,
    pub kind: ParamKind,
    pub required: bool,
    pub default: ParamDefault,
    pub slot: PositionalSlot,
}

impl ParamSpec {
    #[must_use]
    pub const fn new(key: ParamKey, kind: ParamKind) -> Self {
        Self {
            key,
            kind,
            required: false,
            default: ParamDefault::None,
            slot: PositionalSlot::Fixed,
        }
    }

    #[must_use]
    pub const fn required(self) -> Self {
        Self {
            required: true,
            ..self
        }
    }

    #[must_use]
    pub const fn with_default(self, default: ParamDefault) -> Self {
        Self { default, ..self }
    }

    #[must_use]
    pub const fn elidable(self) -> Self {
        Self {
            slot: PositionalSlot::Elidable,
            ..self
        }
    }

    #[must_use]
    pub const fn named_only(self) -> Self {
        Self {
            slot: PositionalSlot::NamedOnly,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionalRule {
    /// One token per positional slot, in schema order.
    Ordered,
    /// Range short forms: one token is `end`; two tokens are `start end` when
    /// both parse as numbers and `end dtype` otherwise. Longer forms are
    /// ordered.
    RangeShortForm,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSchema {
    pub name: &'static str,
    pub params: &'static [ParamSpec],
    /// Parameters bound from the positional prefix of a hybrid invocation.
    /// The first entry is the schema's leading parameter.
    pub hybrid_prefix: &'static [ParamKey],
    pub positional_rule: PositionalRule,
    /// `(low, high)`: swapped after resolution when `low > high`.
    pub ordered_pair: Option<(ParamKey, ParamKey)>,
}

impl ParameterSchema {
    #[must_use]
    pub fn leading(&self) -> Option<ParamKey> {
        self.hybrid_prefix.first().copied()
    }

    #[must_use]
    pub fn spec(&self, key: ParamKey) -> Option<&ParamSpec> {
        self.params.iter().find(|spec| spec.key == key)
    }

    /// Looks up a parameter by its unmarked name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&ParamSpec> {
        ParamKey::from_name(name).and_then(|key| self.spec(key))
    }

    pub fn positional_slots(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params
            .iter()
            .filter(|spec| spec.slot != PositionalSlot::NamedOnly)
    }

    /// Inclusive `(min, max)` token counts accepted in positional form.
    #[must_use]
    pub fn positional_arity(&self) -> (usize, usize) {
        let max = self.positional_slots().count();
        let min = match self.positional_rule {
            PositionalRule::RangeShortForm => 1,
            PositionalRule::Ordered => self
                .positional_slots()
                .enumerate()
                .filter(|(_, spec)| spec.required)
                .map(|(idx, _)| idx + 1)
                .max()
                .unwrap_or(0),
        };
        (min, max)
    }
}

const DTYPE_F32: ParamSpec =
    ParamSpec::new(ParamKey::DType, ParamKind::DType).with_default(ParamDefault::DType(DType::F32));
const DEVICE_CPU: ParamSpec = ParamSpec::new(ParamKey::Device, ParamKind::Device)
    .with_default(ParamDefault::Device(Device::Cpu));
const REQUIRES_GRAD: ParamSpec = ParamSpec::new(ParamKey::RequiresGrad, ParamKind::Boolean)
    .with_default(ParamDefault::Boolean(false));
const INPUT: ParamSpec = ParamSpec::new(ParamKey::Input, ParamKind::String).required();
const INHERIT_DTYPE: ParamSpec = ParamSpec::new(ParamKey::DType, ParamKind::DType);
const INHERIT_DEVICE: ParamSpec = ParamSpec::new(ParamKey::Device, ParamKind::Device);

/// `zeros`, `ones`, `empty`.
pub const CREATION_SCHEMA: ParameterSchema = ParameterSchema {
    name: "creation",
    params: &[
        ParamSpec::new(ParamKey::Shape, ParamKind::Shape).required(),
        DTYPE_F32,
        DEVICE_CPU,
        REQUIRES_GRAD,
    ],
    hybrid_prefix: &[ParamKey::Shape],
    positional_rule: PositionalRule::Ordered,
    ordered_pair: None,
};

pub const FULL_SCHEMA: ParameterSchema = ParameterSchema {
    name: "full",
    params: &[
        ParamSpec::new(ParamKey::Shape, ParamKind::Shape).required(),
        ParamSpec::new(ParamKey::Value, ParamKind::Number).required(),
        DTYPE_F32,
        DEVICE_CPU,
        REQUIRES_GRAD,
    ],
    hybrid_prefix: &[ParamKey::Shape, ParamKey::Value],
    positional_rule: PositionalRule::Ordered,
    ordered_pair: None,
};

pub const EYE_SCHEMA: ParameterSchema = ParameterSchema {
    name: "eye",
    params: &[
        ParamSpec::new(ParamKey::N, ParamKind::Integer).required(),
        ParamSpec::new(ParamKey::M, ParamKind::Integer)
            .with_default(ParamDefault::SameAs(ParamKey::N))
            .elidable(),
        DTYPE_F32,
        DEVICE_CPU,
        REQUIRES_GRAD,
    ],
    hybrid_prefix: &[ParamKey::N],
    positional_rule: PositionalRule::Ordered,
    ordered_pair: None,
};

pub const ARANGE_SCHEMA: ParameterSchema = ParameterSchema {
    name: "arange",
    params: &[
        ParamSpec::new(ParamKey::Start, ParamKind::Number).with_default(ParamDefault::Number(0.0)),
        ParamSpec::new(ParamKey::End, ParamKind::Number).required(),
        ParamSpec::new(ParamKey::Step, ParamKind::Number)
            .with_default(ParamDefault::Number(1.0))
            .elidable(),
        DTYPE_F32,
        DEVICE_CPU,
    ],
    hybrid_prefix: &[ParamKey::End],
    positional_rule: PositionalRule::RangeShortForm,
    ordered_pair: None,
};

pub const LINSPACE_SCHEMA: ParameterSchema = ParameterSchema {
    name: "linspace",
    params: &[
        ParamSpec::new(ParamKey::Start, ParamKind::Number).with_default(ParamDefault::Number(0.0)),
        ParamSpec::new(ParamKey::End, ParamKind::Number).with_default(ParamDefault::Number(0.0)),
        ParamSpec::new(ParamKey::Steps, ParamKind::Integer).required(),
        DTYPE_F32,
        DEVICE_CPU,
    ],
    hybrid_prefix: &[ParamKey::Start, ParamKey::End, ParamKey::Steps],
    positional_rule: PositionalRule::Ordered,
    ordered_pair: None,
};

pub const LOGSPACE_SCHEMA: ParameterSchema = ParameterSchema {
    name: "logspace",
    params: &[
        ParamSpec::new(ParamKey::Start, ParamKind::Number).with_default(ParamDefault::Number(0.0)),
        ParamSpec::new(ParamKey::End, ParamKind::Number).with_default(ParamDefault::Number(0.0)),
        ParamSpec::new(ParamKey::Steps, ParamKind::Integer).required(),
        ParamSpec::new(ParamKey::Base, ParamKind::Number)
            .with_default(ParamDefault::Number(10.0))
            .elidable(),
        DTYPE_F32,
        DEVICE_CPU,
    ],
    hybrid_prefix: &[ParamKey::Start, ParamKey::End, ParamKey::Steps],
    positional_rule: PositionalRule::Ordered,
    ordered_pair: None,
};

/// `empty_like`, `zeros_like`, `ones_like`, `rand_like`, `randn_like`.
/// Unset dtype and device inherit from the input tensor.
pub const LIKE_SCHEMA: ParameterSchema = ParameterSchema {
    name: "like",
    params: &[
        INPUT,
        INHERIT_DTYPE,
        INHERIT_DEVICE,
        REQUIRES_GRAD.named_only(),
    ],
    hybrid_prefix: &[ParamKey::Input],
    positional_rule: PositionalRule::Ordered,
    ordered_pair: None,
};

pub const FULL_LIKE_SCHEMA: ParameterSchema = ParameterSchema {
    name: "full_like",
    params: &[
        INPUT,
        ParamSpec::new(ParamKey::Value, ParamKind::Number).required(),
        INHERIT_DTYPE,
        INHERIT_DEVICE,
        REQUIRES_GRAD.named_only(),
    ],
    hybrid_prefix: &[ParamKey::Input, ParamKey::Value],
    positional_rule: PositionalRule::Ordered,
    ordered_pair: None,
};

pub const RANDINT_LIKE_SCHEMA: ParameterSchema = ParameterSchema {
    name: "randint_like",
    params: &[
        INPUT,
        ParamSpec::new(ParamKey::High, ParamKind::Integer).required(),
        ParamSpec::new(ParamKey::Low, ParamKind::Integer)
            .with_default(ParamDefault::Integer(0))
            .elidable(),
        ParamSpec::new(ParamKey::DType, ParamKind::DType)
            .with_default(ParamDefault::DType(DType::I64)),
        INHERIT_DEVICE,
        REQUIRES_GRAD.named_only(),
    ],
    hybrid_prefix: &[ParamKey::Input, ParamKey::High],
    positional_rule: PositionalRule::Ordered,
    ordered_pair: Some((ParamKey::Low, ParamKey::High)),
};

pub const ALL_SCHEMAS: &[&ParameterSchema] = &[
    &CREATION_SCHEMA,
    &FULL_SCHEMA,
    &EYE_SCHEMA,
    &ARANGE_SCHEMA,
    &LINSPACE_SCHEMA,
    &LOGSPACE_SCHEMA,
    &LIKE_SCHEMA,
    &FULL_LIKE_SCHEMA,
    &RANDINT_LIKE_SCHEMA,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// The invocation itself is malformed.
    Syntax,
    /// The invocation is well formed but a value is not acceptable.
    Semantic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    UnknownParameter {
        name: String,
    },
    MissingRequired {
        name: String,
    },
    MissingValue {
        name: String,
    },
    TypeMismatch {
        name: String,
        expected: ParamKind,
        value: String,
    },
    UnknownEnumValue {
        kind: EnumKind,
        value: String,
    },
    Arity {
        min: usize,
        max: usize,
        actual: usize,
    },
}

impl ResolutionError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownParameter { .. } | Self::MissingValue { .. } | Self::Arity { .. } => {
                ErrorClass::Syntax
            }
            Self::MissingRequired { .. }
            | Self::TypeMismatch { .. }
            | Self::UnknownEnumValue { .. } => ErrorClass::Semantic,
        }
    }

    #[must_use]
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::UnknownParameter { .. } => "unknown_parameter",
            Self::MissingRequired { .. } => "missing_required",
            Self::MissingValue { .. } => "missing_value",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::UnknownEnumValue { .. } => "unknown_enum_value",
            Self::Arity { .. } => "arity",
        }
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownParameter { name } => write!(f, "Unknown parameter: {name}"),
            Self::MissingRequired { name } => {
                write!(f, "Missing required parameter: {OPTION_MARKER}{name}")
            }
            Self::MissingValue { name } if name.is_empty() => {
                f.write_str("Missing value for trailing argument")
            }
            Self::MissingValue { name } => write!(f, "Missing value for parameter: {name}"),
            Self::TypeMismatch {
                name,
                expected,
                value,
            } => write!(
                f,
                "Invalid value for {OPTION_MARKER}{name}: expected {expected}, got \"{value}\""
            ),
            Self::UnknownEnumValue { kind, value } => match kind {
                EnumKind::DType => write!(f, "Unknown scalar type: {value}"),
                EnumKind::Device => write!(f, "Invalid device string: {value}"),
            },
            Self::Arity { min, max, actual } => write!(
                f,
                "Wrong number of arguments: expected {min}..={max} positional values, got {actual}"
            ),
        }
    }
}

impl std::error::Error for ResolutionError {}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedParameters {
    values: BTreeMap<ParamKey, ParamValue>,
}

impl ResolvedParameters {
    #[must_use]
    pub fn get(&self, key: ParamKey) -> Option<&ParamValue> {
        self.values.get(&key)
    }

    #[must_use]
    pub fn contains(&self, key: ParamKey) -> bool {
        self.values.contains_key(&key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamKey, &ParamValue)> {
        self.values.iter().map(|(key, value)| (*key, value))
    }

    pub fn shape(&self, key: ParamKey) -> Result<&[i64], ResolutionError> {
        match self.require(key)? {
            ParamValue::Shape(shape) => Ok(shape),
            other => Err(Self::wrong_kind(key, ParamKind::Shape, other)),
        }
    }

    pub fn number(&self, key: ParamKey) -> Result<f64, ResolutionError> {
        match self.require(key)? {
            ParamValue::Number(value) => Ok(*value),
            ParamValue::Integer(value) => Ok(*value as f64),
            other => Err(Self::wrong_kind(key, ParamKind::Number, other)),
        }
    }

    pub fn integer(&self, key: ParamKey) -> Result<i64, ResolutionError> {
        match self.require(key)? {
            ParamValue::Integer(value) => Ok(*value),
            other => Err(Self::wrong_kind(key, ParamKind::Integer, other)),
        }
    }

    pub fn boolean(&self, key: ParamKey) -> Result<bool, ResolutionError> {
        match self.require(key)? {
            ParamValue::Boolean(flag) => Ok(*flag),
            other => Err(Self::wrong_kind(key, ParamKind::Boolean, other)),
        }
    }

    pub fn string(&self, key: ParamKey) -> Result<&str, ResolutionError> {
        match self.require(key)? {
            ParamValue::String(value) => Ok(value),
            other => Err(Self::wrong_kind(key, ParamKind::String, other)),
        }
    }

    pub fn dtype(&self, key: ParamKey) -> Result<DType, ResolutionError> {
        match self.require(key)? {
            ParamValue::DType(dtype) => Ok(*dtype),
            other => Err(Self::wrong_kind(key, ParamKind::DType, other)),
        }
    }

    pub fn device(&self, key: ParamKey) -> Result<Device, ResolutionError> {
        match self.require(key)? {
            ParamValue::Device(device) => Ok(*device),
            other => Err(Self::wrong_kind(key, ParamKind::Device, other)),
        }
    }

    /// `Ok(None)` when the parameter is unbound, e.g. an inherited dtype.
    pub fn optional_dtype(&self, key: ParamKey) -> Result<Option<DType>, ResolutionError> {
        if self.contains(key) {
            self.dtype(key).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn optional_device(&self, key: ParamKey) -> Result<Option<Device>, ResolutionError> {
        if self.contains(key) {
            self.device(key).map(Some)
        } else {
            Ok(None)
        }
    }

    /// The record written back out in named syntax.
    #[must_use]
    pub fn to_named_tokens(&self) -> Vec<String> {
        self.iter()
            .flat_map(|(key, value)| [format!("{OPTION_MARKER}{}", key.name()), value.to_token()])
            .collect()
    }

    fn require(&self, key: ParamKey) -> Result<&ParamValue, ResolutionError> {
        self.values
            .get(&key)
            .ok_or_else(|| ResolutionError::MissingRequired {
                name: key.name().to_string(),
            })
    }

    fn wrong_kind(key: ParamKey, expected: ParamKind, found: &ParamValue) -> ResolutionError {
        ResolutionError::TypeMismatch {
            name: key.name().to_string(),
            expected,
            value: found.to_token(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub syntax: SyntaxForm,
    pub params: ResolvedParameters,
    /// Set when a device name was resolved; carries whether `cuda` fell back.
    pub device: Option<DeviceResolution>,
}

impl Resolution {
    #[must_use]
    pub fn device_fell_back(&self) -> bool {
        self.device.is_some_and(|resolution| resolution.fell_back())
    }
}

/// Resolves `tokens` against `schema`. Stops at the first error.
pub fn resolve<S: AsRef<str>>(
    schema: &ParameterSchema,
    tokens: &[S],
    probe: &impl AcceleratorProbe,
) -> Result<Resolution, ResolutionError> {
    let syntax = classify(tokens);
    let mut binder = Binder::default();
    match syntax {
        SyntaxForm::Positional => binder.walk_positional(schema, tokens, probe)?,
        SyntaxForm::Named => binder.walk_named(schema, tokens, probe)?,
        SyntaxForm::Hybrid => {
            let prefix = schema.hybrid_prefix.len();
            let leading = tokens
                .iter()
                .take_while(|token| !is_option_token(token.as_ref()))
                .count();
            if leading < prefix {
                return Err(ResolutionError::Arity {
                    min: prefix,
                    max: prefix,
                    actual: leading,
                });
            }
            for (key, token) in schema.hybrid_prefix.iter().zip(tokens) {
                binder.bind_key(schema, *key, token.as_ref(), probe)?;
            }
            binder.walk_named(schema, &tokens[prefix..], probe)?;
        }
    }

    let device = binder.device;
    let params = binder.finish(schema)?;
    Ok(Resolution {
        syntax,
        params,
        device,
    })
}

fn coerce(
    spec: &ParamSpec,
    token: &str,
    probe: &impl AcceleratorProbe,
) -> Result<(ParamValue, Option<DeviceResolution>), ResolutionError> {
    let mismatch = || ResolutionError::TypeMismatch {
        name: spec.key.name().to_string(),
        expected: spec.kind,
        value: token.to_string(),
    };

    let value = match spec.kind {
        ParamKind::Shape => ParamValue::Shape(decode_shape(token).map_err(|_| mismatch())?),
        ParamKind::DType => {
            let dtype = DType::from_name(token).map_err(|_| ResolutionError::UnknownEnumValue {
                kind: EnumKind::DType,
                value: token.to_string(),
            })?;
            ParamValue::DType(dtype)
        }
        ParamKind::Device => {
            let resolution =
                resolve_device(token, probe).map_err(|_| ResolutionError::UnknownEnumValue {
                    kind: EnumKind::Device,
                    value: token.to_string(),
                })?;
            return Ok((ParamValue::Device(resolution.device), Some(resolution)));
        }
        ParamKind::Boolean => ParamValue::Boolean(parse_boolean(token).ok_or_else(mismatch)?),
        ParamKind::Number => ParamValue::Number(parse_number(token).ok_or_else(mismatch)?),
        ParamKind::Integer => ParamValue::Integer(parse_integer(token).ok_or_else(mismatch)?),
        ParamKind::String => ParamValue::String(token.to_string()),
    };
    Ok((value, None))
}

#[derive(Debug, Default)]
struct Binder {
    values: BTreeMap<ParamKey, ParamValue>,
    device: Option<DeviceResolution>,
}

impl Binder {
    fn store(&mut self, key: ParamKey, (value, device): (ParamValue, Option<DeviceResolution>)) {
        if device.is_some() {
            self.device = device;
        }
        self.values.insert(key, value);
    }

    fn bind(
        &mut self,
        spec: &ParamSpec,
        token: &str,
        probe: &impl AcceleratorProbe,
    ) -> Result<(), ResolutionError> {
        let coerced = coerce(spec, token, probe)?;
        self.store(spec.key, coerced);
        Ok(())
    }

    fn bind_key(
        &mut self,
        schema: &ParameterSchema,
        key: ParamKey,
        token: &str,
        probe: &impl AcceleratorProbe,
    ) -> Result<(), ResolutionError> {
        let spec = schema
            .spec(key)
            .ok_or_else(|| ResolutionError::UnknownParameter {
                name: key.name().to_string(),
            })?;
        self.bind(spec, token, probe)
    }

    fn walk_positional<S: AsRef<str>>(
        &mut self,
        schema: &ParameterSchema,
        tokens: &[S],
        probe: &impl AcceleratorProbe,
    ) -> Result<(), ResolutionError> {
        let (min, max) = schema.positional_arity();
        let actual = tokens.len();
        if actual < min || actual > max {
            return Err(ResolutionError::Arity { min, max, actual });
        }

        if schema.positional_rule == PositionalRule::RangeShortForm {
            match tokens {
                [end] => return self.bind_key(schema, ParamKey::End, end.as_ref(), probe),
                [first, second] => {
                    let (first, second) = (first.as_ref(), second.as_ref());
                    if parse_number(first).is_some() && parse_number(second).is_some() {
                        self.bind_key(schema, ParamKey::Start, first, probe)?;
                        return self.bind_key(schema, ParamKey::End, second, probe);
                    }
                    self.bind_key(schema, ParamKey::End, first, probe)?;
                    return self.bind_key(schema, ParamKey::DType, second, probe);
                }
                _ => {}
            }
        }

        let mut slots = schema.positional_slots();
        for token in tokens {
            let token = token.as_ref();
            loop {
                let Some(spec) = slots.next() else {
                    return Err(ResolutionError::Arity { min, max, actual });
                };
                match coerce(spec, token, probe) {
                    Ok(coerced) => {
                        self.store(spec.key, coerced);
                        break;
                    }
                    Err(_) if spec.slot == PositionalSlot::Elidable => {}
                    Err(error) => return Err(error),
                }
            }
        }
        Ok(())
    }

    fn walk_named<S: AsRef<str>>(
        &mut self,
        schema: &ParameterSchema,
        tokens: &[S],
        probe: &impl AcceleratorProbe,
    ) -> Result<(), ResolutionError> {
        if tokens.len() % 2 == 1 {
            // A dangling value token names no parameter.
            let dangling = tokens[tokens.len() - 1].as_ref();
            return Err(ResolutionError::MissingValue {
                name: option_name(dangling).unwrap_or_default().to_string(),
            });
        }

        // Names are checked before any value is coerced.
        let mut pairs = Vec::with_capacity(tokens.len() / 2);
        for pair in tokens.chunks_exact(2) {
            let name = pair[0].as_ref();
            let spec = option_name(name)
                .and_then(|unmarked| schema.lookup(unmarked))
                .ok_or_else(|| ResolutionError::UnknownParameter {
                    name: strip_marker(name).to_string(),
                })?;
            pairs.push((spec, pair[1].as_ref()));
        }

        for (spec, value) in pairs {
            self.bind(spec, value, probe)?;
        }
        Ok(())
    }

    fn finish(mut self, schema: &ParameterSchema) -> Result<ResolvedParameters, ResolutionError> {
        for spec in schema.params {
            if !self.values.contains_key(&spec.key) {
                if let Some(value) = spec.default.value() {
                    self.values.insert(spec.key, value);
                }
            }
        }

        if let Some(missing) = schema
            .params
            .iter()
            .find(|spec| spec.required && !self.values.contains_key(&spec.key))
        {
            return Err(ResolutionError::MissingRequired {
                name: missing.key.name().to_string(),
            });
        }

        for spec in schema.params {
            if let ParamDefault::SameAs(source) = spec.default {
                if !self.values.contains_key(&spec.key) {
                    if let Some(value) = self.values.get(&source).cloned() {
                        self.values.insert(spec.key, value);
                    }
                }
            }
        }

        if let Some((low_key, high_key)) = schema.ordered_pair {
            let low = self.values.get(&low_key).and_then(ParamValue::as_f64);
            let high = self.values.get(&high_key).and_then(ParamValue::as_f64);
            if let (Some(low), Some(high)) = (low, high) {
                if low > high {
                    let low_value = self.values.remove(&low_key);
                    let high_value = self.values.remove(&high_key);
                    if let (Some(low_value), Some(high_value)) = (low_value, high_value) {
                        self.values.insert(low_key, high_value);
                        self.values.insert(high_key, low_value);
                    }
                }
            }
        }

        Ok(ResolvedParameters {
            values: self.values,
        })
    }
}
