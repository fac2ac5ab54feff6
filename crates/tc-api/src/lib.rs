#![forbid(unsafe_code)]

use std::fmt;

use serde::Deserialize;
use tc_core::Device;
use tc_engine::{
    DEFAULT_SEED, EngineError, HostEngine, LikeInit, LikeOptions, TensorEngine, TensorOptions,
};
use tc_params::{
    ARANGE_SCHEMA, CREATION_SCHEMA, EYE_SCHEMA, FULL_LIKE_SCHEMA, FULL_SCHEMA, LIKE_SCHEMA,
    LINSPACE_SCHEMA, LOGSPACE_SCHEMA, ParamKey, ParameterSchema, RANDINT_LIKE_SCHEMA, Resolution,
    ResolutionError, ResolvedParameters, resolve,
};
use tc_runtime::{DEFAULT_HANDLE_PREFIX, EvidenceEntry, EvidenceKind, EvidenceLedger, HandleRegistry};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub handle_prefix: String,
    pub accelerator_available: bool,
    pub random_seed: u64,
    pub record_evidence: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handle_prefix: DEFAULT_HANDLE_PREFIX.to_string(),
            accelerator_available: false,
            random_seed: DEFAULT_SEED,
            record_evidence: true,
        }
    }
}

impl SessionConfig {
    /// Parses a JSON object; absent fields keep their defaults.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(input).map_err(|error| {
            let message = error.to_string();
            match extract_unknown_field(&message) {
                Some(field) => ConfigError::UnknownField { field },
                None => ConfigError::InvalidJson {
                    diagnostic: message,
                },
            }
        })
    }

    #[must_use]
    pub fn host_engine(&self) -> HostEngine {
        HostEngine::new(self.random_seed).with_accelerator(self.accelerator_available)
    }
}

fn extract_unknown_field(message: &str) -> Option<String> {
    // serde_json message shape: "unknown field `x`, expected ..."
    let marker = "unknown field `";
    let start = message.find(marker)? + marker.len();
    let tail = &message[start..];
    let end = tail.find('`')?;
    Some(tail[..end].to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidJson { diagnostic: String },
    UnknownField { field: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson { diagnostic } => write!(f, "invalid session config: {diagnostic}"),
            Self::UnknownField { field } => write!(f, "unknown session config field: {field}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Command {
    Zeros,
    Ones,
    Empty,
    Full,
    Eye,
    Arange,
    Linspace,
    Logspace,
    EmptyLike,
    ZerosLike,
    OnesLike,
    FullLike,
    RandLike,
    RandnLike,
    RandintLike,
}

impl Command {
    #[must_use]
    pub const fn all() -> &'static [Command] {
        &[
            Command::Zeros,
            Command::Ones,
            Command::Empty,
            Command::Full,
            Command::Eye,
            Command::Arange,
            Command::Linspace,
            Command::Logspace,
            Command::EmptyLike,
            Command::ZerosLike,
            Command::OnesLike,
            Command::FullLike,
            Command::RandLike,
            Command::RandnLike,
            Command::RandintLike,
        ]
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Zeros => "zeros",
            Self::Ones => "ones",
            Self::Empty => "empty",
            Self::Full => "full",
            Self::Eye => "eye",
            Self::Arange => "arange",
            Self::Linspace => "linspace",
            Self::Logspace => "logspace",
            Self::EmptyLike => "empty_like",
            Self::ZerosLike => "zeros_like",
            Self::OnesLike => "ones_like",
            Self::FullLike => "full_like",
            Self::RandLike => "rand_like",
            Self::RandnLike => "randn_like",
            Self::RandintLike => "randint_like",
        }
    }

    #[must_use]
    pub const fn alias(self) -> Option<&'static str> {
        match self {
            Self::Empty => Some("Empty"),
            Self::EmptyLike => Some("emptyLike"),
            Self::ZerosLike => Some("zerosLike"),
            Self::OnesLike => Some("onesLike"),
            Self::FullLike => Some("fullLike"),
            Self::RandLike => Some("randLike"),
            Self::RandnLike => Some("randnLike"),
            Self::RandintLike => Some("randintLike"),
            Self::Zeros
            | Self::Ones
            | Self::Full
            | Self::Eye
            | Self::Arange
            | Self::Linspace
            | Self::Logspace => None,
        }
    }

    /// Looks up a command by its name or alias. Case-sensitive.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|command| command.name() == name || command.alias() == Some(name))
    }

    #[must_use]
    pub fn schema(self) -> &'static ParameterSchema {
        match self {
            Self::Zeros | Self::Ones | Self::Empty => &CREATION_SCHEMA,
            Self::Full => &FULL_SCHEMA,
            Self::Eye => &EYE_SCHEMA,
            Self::Arange => &ARANGE_SCHEMA,
            Self::Linspace => &LINSPACE_SCHEMA,
            Self::Logspace => &LOGSPACE_SCHEMA,
            Self::EmptyLike
            | Self::ZerosLike
            | Self::OnesLike
            | Self::RandLike
            | Self::RandnLike => &LIKE_SCHEMA,
            Self::FullLike => &FULL_LIKE_SCHEMA,
            Self::RandintLike => &RANDINT_LIKE_SCHEMA,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub handle: String,
    pub device: Device,
    /// True when `cuda` was asked for and the tensor landed on CPU.
    pub device_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    UnknownCommand { name: String },
    Resolution(ResolutionError),
    UnknownHandle { handle: String },
    Engine(EngineError),
}

impl CommandError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::UnknownCommand { .. } => "unknown_command",
            Self::Resolution(error) => error.reason_code(),
            Self::UnknownHandle { .. } => "unknown_handle",
            Self::Engine(_) => "engine",
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand { name } => write!(f, "invalid command name \"{name}\""),
            Self::Resolution(error) => write!(f, "{error}"),
            Self::UnknownHandle { handle } => write!(f, "Invalid tensor name: {handle}"),
            Self::Engine(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<ResolutionError> for CommandError {
    fn from(value: ResolutionError) -> Self {
        Self::Resolution(value)
    }
}

impl From<EngineError> for CommandError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

/// Runs tensor-creation commands against an engine and keeps the results
/// under string handles.
pub struct CommandSession<E: TensorEngine> {
    config: SessionConfig,
    engine: E,
    registry: HandleRegistry<E::Tensor>,
    ledger: EvidenceLedger,
}

impl CommandSession<HostEngine> {
    #[must_use]
    pub fn host(config: SessionConfig) -> Self {
        let engine = config.host_engine();
        Self::new(engine, config)
    }
}

impl<E: TensorEngine> CommandSession<E> {
    #[must_use]
    pub fn new(engine: E, config: SessionConfig) -> Self {
        let mut ledger = if config.record_evidence {
            EvidenceLedger::new()
        } else {
            EvidenceLedger::disabled()
        };
        ledger.record(
            EvidenceKind::Policy,
            format!(
                "session initialized handle_prefix={} accelerator_available={} record_evidence={}",
                config.handle_prefix,
                engine.accelerator_available(),
                config.record_evidence
            ),
        );
        Self {
            registry: HandleRegistry::new(config.handle_prefix.clone()),
            config,
            engine,
            ledger,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    #[must_use]
    pub fn tensor(&self, handle: &str) -> Option<&E::Tensor> {
        self.registry.lookup(handle)
    }

    #[must_use]
    pub fn tensor_count(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn evidence(&self) -> &[EvidenceEntry] {
        self.ledger.entries()
    }

    #[must_use]
    pub fn ledger(&self) -> &EvidenceLedger {
        &self.ledger
    }

    /// Resolves an invocation without touching the engine or the registry.
    pub fn resolve<S: AsRef<str>>(
        &self,
        command: &str,
        tokens: &[S],
    ) -> Result<Resolution, CommandError> {
        let command = lookup_command(command)?;
        Ok(resolve(command.schema(), tokens, &self.engine)?)
    }

    /// Runs one command. Nothing is registered unless the engine succeeds.
    pub fn invoke<S: AsRef<str>>(
        &mut self,
        command: &str,
        tokens: &[S],
    ) -> Result<CommandOutcome, CommandError> {
        debug!(command, tokens = tokens.len(), "invoking command");
        let result = self.run(command, tokens);
        if let Err(error) = &result {
            warn!(command, reason = error.reason_code(), %error, "command failed");
            self.ledger.record_failure(command, error);
        }
        result
    }

    fn run<S: AsRef<str>>(
        &mut self,
        name: &str,
        tokens: &[S],
    ) -> Result<CommandOutcome, CommandError> {
        let command = lookup_command(name)?;
        let resolution = resolve(command.schema(), tokens, &self.engine)?;
        debug!(
            command = command.name(),
            syntax = resolution.syntax.label(),
            params = resolution.params.len(),
            "resolved parameters"
        );
        self.ledger.record(
            EvidenceKind::Resolution,
            format!(
                "command={} syntax={} params=[{}]",
                command,
                resolution.syntax.label(),
                resolution.params.to_named_tokens().join(" ")
            ),
        );

        let device_fallback = resolution.device_fell_back();
        if device_fallback {
            warn!(command = command.name(), "cuda requested without an accelerator; using cpu");
            self.ledger.record(
                EvidenceKind::DeviceFallback,
                format!("command={command} requested=cuda resolved=cpu"),
            );
        }

        let tensor = self.dispatch(command, &resolution.params)?;
        let device = self.engine.meta(&tensor).device();
        let handle = self.registry.register(tensor);
        self.ledger.record(
            EvidenceKind::Registry,
            format!("handle={handle} command={command} device={device}"),
        );
        Ok(CommandOutcome {
            handle,
            device,
            device_fallback,
        })
    }

    fn dispatch(
        &mut self,
        command: Command,
        params: &ResolvedParameters,
    ) -> Result<E::Tensor, CommandError> {
        let tensor = match command {
            Command::Zeros => {
                self.engine
                    .fill(params.shape(ParamKey::Shape)?, 0.0, tensor_options(params)?)?
            }
            Command::Ones => {
                self.engine
                    .fill(params.shape(ParamKey::Shape)?, 1.0, tensor_options(params)?)?
            }
            Command::Empty => self
                .engine
                .create(params.shape(ParamKey::Shape)?, tensor_options(params)?)?,
            Command::Full => self.engine.fill(
                params.shape(ParamKey::Shape)?,
                params.number(ParamKey::Value)?,
                tensor_options(params)?,
            )?,
            Command::Eye => self.engine.identity(
                params.integer(ParamKey::N)?,
                params.integer(ParamKey::M)?,
                tensor_options(params)?,
            )?,
            Command::Arange => self.engine.range(
                params.number(ParamKey::Start)?,
                params.number(ParamKey::End)?,
                params.number(ParamKey::Step)?,
                tensor_options(params)?,
            )?,
            Command::Linspace => self.engine.range_linear(
                params.number(ParamKey::Start)?,
                params.number(ParamKey::End)?,
                params.integer(ParamKey::Steps)?,
                tensor_options(params)?,
            )?,
            Command::Logspace => self.engine.range_log(
                params.number(ParamKey::Start)?,
                params.number(ParamKey::End)?,
                params.integer(ParamKey::Steps)?,
                params.number(ParamKey::Base)?,
                tensor_options(params)?,
            )?,
            Command::EmptyLike
            | Command::ZerosLike
            | Command::OnesLike
            | Command::FullLike
            | Command::RandLike
            | Command::RandnLike
            | Command::RandintLike => {
                let init = like_init(command, params)?;
                let options = LikeOptions {
                    dtype: params.optional_dtype(ParamKey::DType)?,
                    device: params.optional_device(ParamKey::Device)?,
                    requires_grad: requires_grad(params)?,
                    init,
                };
                let handle = params.string(ParamKey::Input)?;
                let source =
                    self.registry
                        .lookup(handle)
                        .ok_or_else(|| CommandError::UnknownHandle {
                            handle: handle.to_string(),
                        })?;
                self.engine.like(source, options)?
            }
        };

        let meta = self.engine.meta(&tensor);
        self.ledger.record(
            EvidenceKind::Dispatch,
            format!(
                "op={command} shape={:?} dtype={} device={} requires_grad={} meta_fingerprint={:016x}",
                meta.shape(),
                meta.dtype(),
                meta.device(),
                self.engine.requires_grad(&tensor),
                meta.fingerprint64()
            ),
        );
        Ok(tensor)
    }
}

fn lookup_command(name: &str) -> Result<Command, CommandError> {
    Command::from_name(name).ok_or_else(|| CommandError::UnknownCommand {
        name: name.to_string(),
    })
}

fn requires_grad(params: &ResolvedParameters) -> Result<bool, ResolutionError> {
    if params.contains(ParamKey::RequiresGrad) {
        params.boolean(ParamKey::RequiresGrad)
    } else {
        Ok(false)
    }
}

fn tensor_options(params: &ResolvedParameters) -> Result<TensorOptions, ResolutionError> {
    Ok(TensorOptions {
        dtype: params.dtype(ParamKey::DType)?,
        device: params.device(ParamKey::Device)?,
        requires_grad: requires_grad(params)?,
    })
}

fn like_init(command: Command, params: &ResolvedParameters) -> Result<LikeInit, ResolutionError> {
    Ok(match command {
        Command::ZerosLike => LikeInit::Zeros,
        Command::OnesLike => LikeInit::Ones,
        Command::FullLike => LikeInit::Full(params.number(ParamKey::Value)?),
        Command::RandLike => LikeInit::Uniform,
        Command::RandnLike => LikeInit::Normal,
        Command::RandintLike => LikeInit::RandInt {
            low: params.integer(ParamKey::Low)?,
            high: params.integer(ParamKey::High)?,
        },
        _ => LikeInit::Empty,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;
    use tc_core::{DType, Device};
    use tc_params::{ParamKey, ResolutionError, SyntaxForm};
    use tc_runtime::EvidenceKind;

    use super::{Command, CommandError, CommandSession, ConfigError, SessionConfig};

    fn session() -> CommandSession<tc_engine::HostEngine> {
        CommandSession::host(SessionConfig::default())
    }

    #[test]
    fn command_names_and_aliases_resolve() {
        let mut seen = BTreeSet::new();
        for command in Command::all() {
            assert_eq!(Command::from_name(command.name()), Some(*command));
            if let Some(alias) = command.alias() {
                assert_eq!(Command::from_name(alias), Some(*command));
                assert!(seen.insert(alias));
            }
            assert!(seen.insert(command.name()));
        }
        assert_eq!(Command::from_name("ZEROS"), None);
        assert_eq!(Command::from_name("Empty"), Some(Command::Empty));
    }

    #[test]
    fn zeros_positional_creates_tensor() {
        let mut session = session();
        let outcome = session
            .invoke("zeros", &["[2,3]", "float64", "cpu", "1"])
            .expect("zeros should succeed");
        assert_eq!(outcome.handle, "tensor0");
        assert_eq!(outcome.device, Device::Cpu);
        assert!(!outcome.device_fallback);

        let tensor = session.tensor("tensor0").expect("tensor should be registered");
        assert_eq!(tensor.meta().shape(), &[2, 3]);
        assert_eq!(tensor.meta().dtype(), DType::F64);
        assert!(tensor.requires_grad());
        assert!(tensor.values().iter().all(|value| *value == 0.0));
    }

    #[test]
    fn handles_increase_across_commands() {
        let mut session = session();
        let first = session.invoke("ones", &["[2]"]).expect("ones");
        let second = session.invoke("eye", &["3"]).expect("eye");
        let third = session.invoke("Empty", &["-shape", "[1]"]).expect("Empty alias");
        assert_eq!(
            [first.handle, second.handle, third.handle],
            ["tensor0", "tensor1", "tensor2"]
        );
    }

    #[test]
    fn failures_register_nothing_and_keep_the_counter() {
        let mut session = session();
        let err = session
            .invoke("zeros", &["-shape", "[2,3]", "-dtype"])
            .expect_err("dangling option must fail");
        assert!(matches!(
            err,
            CommandError::Resolution(ResolutionError::MissingValue { .. })
        ));
        let err = session
            .invoke("full", &["[2,-3]", "1.0"])
            .expect_err("negative dims fail in the engine");
        assert!(matches!(err, CommandError::Engine(_)));
        assert_eq!(session.tensor_count(), 0);

        let outcome = session.invoke("zeros", &["[1]"]).expect("zeros");
        assert_eq!(outcome.handle, "tensor0");
        assert_eq!(
            session.ledger().entries_of(EvidenceKind::Failure).count(),
            2
        );
    }

    #[test]
    fn unknown_command_is_reported() {
        let mut session = session();
        let err = session
            .invoke("zeroes", &["[1]"])
            .expect_err("unknown command must fail");
        assert_eq!(err.reason_code(), "unknown_command");
        assert_eq!(err.to_string(), "invalid command name \"zeroes\"");
    }

    #[test]
    fn like_commands_inherit_from_source() {
        let mut session = session();
        let source = session
            .invoke("full", &["[2,2]", "3.5", "float64"])
            .expect("full");
        let like = session
            .invoke("onesLike", &[source.handle.as_str()])
            .expect("ones_like");
        let tensor = session.tensor(&like.handle).expect("registered");
        assert_eq!(tensor.meta().shape(), &[2, 2]);
        assert_eq!(tensor.meta().dtype(), DType::F64);
        assert!(tensor.values().iter().all(|value| *value == 1.0));

        let cast = session
            .invoke(
                "full_like",
                &[source.handle.as_str(), "7", "-dtype", "int32", "-requiresGrad", "true"],
            )
            .expect("full_like");
        let tensor = session.tensor(&cast.handle).expect("registered");
        assert_eq!(tensor.meta().dtype(), DType::I32);
        assert!(tensor.requires_grad());
    }

    #[test]
    fn like_commands_check_resolution_before_handles() {
        let mut session = session();
        let err = session
            .invoke("zeros_like", &["missing", "-dtype", "half"])
            .expect_err("bad dtype must win over missing handle");
        assert_eq!(err.reason_code(), "unknown_enum_value");

        let err = session
            .invoke("zeros_like", &["missing"])
            .expect_err("missing handle must fail");
        assert_eq!(
            err,
            CommandError::UnknownHandle {
                handle: "missing".to_string()
            }
        );
    }

    #[test]
    fn randint_like_defaults_to_int64_and_orders_bounds() {
        let mut session = session();
        let source = session.invoke("zeros", &["[16]"]).expect("zeros");
        let outcome = session
            .invoke("randint_like", &[source.handle.as_str(), "2", "10"])
            .expect("randint_like");
        let tensor = session.tensor(&outcome.handle).expect("registered");
        assert_eq!(tensor.meta().dtype(), DType::I64);
        assert!(tensor.values().iter().all(|value| (2.0..10.0).contains(value)));
    }

    #[test]
    fn cuda_falls_back_to_cpu_and_is_recorded() {
        let mut session = session();
        let outcome = session
            .invoke("ones", &["[2]", "-device", "cuda"])
            .expect("ones on cuda");
        assert_eq!(outcome.device, Device::Cpu);
        assert!(outcome.device_fallback);
        assert_eq!(
            session
                .ledger()
                .entries_of(EvidenceKind::DeviceFallback)
                .count(),
            1
        );

        let mut accelerated = CommandSession::host(SessionConfig {
            accelerator_available: true,
            ..SessionConfig::default()
        });
        let outcome = accelerated
            .invoke("ones", &["[2]", "-device", "cuda"])
            .expect("ones on cuda");
        assert_eq!(outcome.device, Device::Cuda);
        assert!(!outcome.device_fallback);
    }

    #[test]
    fn resolve_alone_leaves_session_untouched() {
        let session = session();
        let resolution = session
            .resolve("arange", &["10", "float64"])
            .expect("arange resolves");
        assert_eq!(resolution.syntax, SyntaxForm::Positional);
        assert_eq!(resolution.params.number(ParamKey::End), Ok(10.0));
        assert_eq!(session.tensor_count(), 0);
        assert_eq!(session.evidence().len(), 1);
    }

    #[test]
    fn evidence_trail_covers_a_successful_invocation() {
        let mut session = session();
        session.invoke("linspace", &["0", "1", "5"]).expect("linspace");
        let kinds: Vec<EvidenceKind> = session.evidence().iter().map(|entry| entry.kind).collect();
        assert_eq!(
            kinds,
            [
                EvidenceKind::Policy,
                EvidenceKind::Resolution,
                EvidenceKind::Dispatch,
                EvidenceKind::Registry
            ]
        );
    }

    #[test]
    fn dispatch_evidence_carries_meta_fingerprint() {
        let mut session = session();
        let outcome = session.invoke("eye", &["2", "3"]).expect("eye");
        let fingerprint = session
            .tensor(&outcome.handle)
            .expect("registered tensor")
            .meta()
            .fingerprint64();
        let dispatch = session
            .ledger()
            .entries_of(EvidenceKind::Dispatch)
            .next()
            .expect("dispatch entry");
        assert!(dispatch.summary.starts_with("op=eye shape=[2, 3]"));
        assert!(
            dispatch
                .summary
                .ends_with(&format!("meta_fingerprint={fingerprint:016x}"))
        );
    }

    #[test]
    fn evidence_can_be_disabled() {
        let mut session = CommandSession::host(SessionConfig {
            record_evidence: false,
            ..SessionConfig::default()
        });
        session.invoke("zeros", &["[1]"]).expect("zeros");
        assert!(session.evidence().is_empty());
    }

    #[test]
    fn config_parses_json_with_defaults() {
        let config = SessionConfig::from_json_str(r#"{"handle_prefix": "t", "random_seed": 9}"#)
            .expect("config should parse");
        assert_eq!(config.handle_prefix, "t");
        assert_eq!(config.random_seed, 9);
        assert!(config.record_evidence);

        let mut session = CommandSession::host(config);
        let outcome = session.invoke("zeros", &["[1]"]).expect("zeros");
        assert_eq!(outcome.handle, "t0");
    }

    #[test]
    fn config_rejects_unknown_fields_and_bad_json() {
        let err = SessionConfig::from_json_str(r#"{"handle_prefx": "t"}"#)
            .expect_err("typo must fail");
        assert_eq!(
            err,
            ConfigError::UnknownField {
                field: "handle_prefx".to_string()
            }
        );
        let err = SessionConfig::from_json_str("{").expect_err("truncated json must fail");
        assert!(matches!(err, ConfigError::InvalidJson { .. }));
    }

    proptest! {
        #[test]
        fn prop_failed_invocations_never_register(
            tokens in prop::collection::vec(
                prop_oneof![
                    Just("-shape"), Just("-dtype"), Just("float16"), Just("[2,x]"),
                    Just("-bogus"), Just("-device"), Just("tpu"),
                ],
                0..6,
            ),
        ) {
            let mut session = session();
            let result = session.invoke("zeros", &tokens);
            match result {
                Ok(outcome) => {
                    prop_assert_eq!(session.tensor_count(), 1);
                    prop_assert_eq!(outcome.handle, "tensor0");
                }
                Err(_) => prop_assert_eq!(session.tensor_count(), 0),
            }
        }
    }
}
