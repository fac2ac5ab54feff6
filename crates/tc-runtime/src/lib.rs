#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceKind {
    Policy,
    Resolution,
    DeviceFallback,
    Dispatch,
    Registry,
    Failure,
}

impl EvidenceKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Resolution => "resolution",
            Self::DeviceFallback => "device_fallback",
            Self::Dispatch => "dispatch",
            Self::Registry => "registry",
            Self::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceEntry {
    pub ts_unix_ms: u128,
    pub kind: EvidenceKind,
    pub summary: String,
}

/// Append-only record of what a session decided and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceLedger {
    enabled: bool,
    entries: Vec<EvidenceEntry>,
}

impl Default for EvidenceLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl EvidenceLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            entries: Vec::new(),
        }
    }

    /// A ledger that drops every entry.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, kind: EvidenceKind, summary: impl Into<String>) {
        if !self.enabled {
            return;
        }
        self.entries.push(EvidenceEntry {
            ts_unix_ms: now_unix_ms(),
            kind,
            summary: summary.into(),
        });
    }

    pub fn record_failure<E>(&mut self, command: &str, error: &E)
    where
        E: fmt::Display + ?Sized,
    {
        self.record(
            EvidenceKind::Failure,
            format!("command={command} error={error}"),
        );
    }

    #[must_use]
    pub fn entries(&self) -> &[EvidenceEntry] {
        &self.entries
    }

    pub fn entries_of(&self, kind: EvidenceKind) -> impl Iterator<Item = &EvidenceEntry> {
        self.entries.iter().filter(move |entry| entry.kind == kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub const DEFAULT_HANDLE_PREFIX: &str = "tensor";

/// Owns values under generated string handles (`prefix` + counter).
///
/// The counter starts at zero and only moves forward, so a handle is never
/// handed out twice.
#[derive(Debug, Clone)]
pub struct HandleRegistry<T> {
    prefix: String,
    next: u64,
    entries: BTreeMap<String, T>,
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HANDLE_PREFIX)
    }
}

impl<T> HandleRegistry<T> {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
            entries: BTreeMap::new(),
        }
    }

    /// The handle the next `register` call will return.
    #[must_use]
    pub fn peek_next(&self) -> String {
        format!("{}{}", self.prefix, self.next)
    }

    pub fn register(&mut self, value: T) -> String {
        let handle = self.peek_next();
        self.next += 1;
        self.entries.insert(handle.clone(), value);
        handle
    }

    #[must_use]
    pub fn lookup(&self, handle: &str) -> Option<&T> {
        self.entries.get(handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn now_unix_ms() -> u128 {
    let now = std::time::SystemTime::now();
    now.duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::{EvidenceKind, EvidenceLedger, HandleRegistry};

    #[test]
    fn ledger_records_in_order() {
        let mut ledger = EvidenceLedger::new();
        ledger.record(EvidenceKind::Policy, "session started");
        ledger.record(EvidenceKind::Dispatch, "op=full");

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.entries()[1].kind, EvidenceKind::Dispatch);
        assert_eq!(ledger.entries_of(EvidenceKind::Policy).count(), 1);
    }

    #[test]
    fn disabled_ledger_drops_entries() {
        let mut ledger = EvidenceLedger::disabled();
        ledger.record(EvidenceKind::Policy, "ignored");
        ledger.record_failure("zeros", "bad shape");
        assert!(ledger.is_empty());
        assert!(!ledger.is_enabled());
    }

    #[test]
    fn failure_summary_carries_command_and_error() {
        let mut ledger = EvidenceLedger::new();
        ledger.record_failure("eye", "Unknown scalar type: half");
        let entry = ledger
            .entries_of(EvidenceKind::Failure)
            .next()
            .expect("failure entry should be present");
        assert_eq!(entry.summary, "command=eye error=Unknown scalar type: half");
        assert_eq!(entry.kind.label(), "failure");
    }

    #[test]
    fn registry_generates_sequential_handles() {
        let mut registry = HandleRegistry::default();
        assert_eq!(registry.register(1.0), "tensor0");
        assert_eq!(registry.register(2.0), "tensor1");
        assert_eq!(registry.lookup("tensor1"), Some(&2.0));
        assert_eq!(registry.lookup("tensor2"), None);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn custom_prefix_counts_from_zero() {
        let mut registry = HandleRegistry::new("t");
        assert!(registry.is_empty());
        assert_eq!(registry.peek_next(), "t0");
        assert_eq!(registry.register("a"), "t0");
        assert_eq!(registry.peek_next(), "t1");
    }

    proptest! {
        #[test]
        fn prop_handles_are_unique(count in 0usize..64) {
            let mut registry = HandleRegistry::new("h");
            let handles: BTreeSet<String> = (0..count).map(|idx| registry.register(idx)).collect();
            prop_assert_eq!(handles.len(), count);
            prop_assert_eq!(registry.len(), count);
            prop_assert_eq!(registry.peek_next(), format!("h{count}"));
        }
    }
}
