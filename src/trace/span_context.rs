use crate::error::{TraceError, TraceResult};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use thiserror::Error;

/// The flag byte of a [`SpanContext`], propagated alongside the ids.
///
/// Bit 0 is the `sampled` flag; all other bits are reserved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// Flags with every bit clear.
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(0x00);

    /// Flags with only the `sampled` bit set. Spans without this bit are
    /// ignored by most tracing backends.
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    /// Flags from a raw byte.
    pub const fn new(flags: u8) -> Self {
        TraceFlags(flags)
    }

    /// Whether the `sampled` bit is set.
    pub fn is_sampled(&self) -> bool {
        self.0 & TraceFlags::SAMPLED.0 != 0
    }
}

/// Identifies a trace: 16 bytes, rendered as 32 lowercase hex digits.
///
/// The all-zero id is reserved as the invalid sentinel.
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// The reserved all-zero trace id.
    pub const INVALID: TraceId = TraceId(0);

    /// A trace id from its big-endian byte representation.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(u128::from_be_bytes(bytes))
    }

    /// The big-endian byte representation of this trace id.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Parses a trace id from its hex rendering.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u128::from_str_radix(hex, 16).map(TraceId)
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Identifies a span within a trace: 8 bytes, rendered as 16 lowercase hex
/// digits.
///
/// The all-zero id is reserved as the invalid sentinel.
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// The reserved all-zero span id.
    pub const INVALID: SpanId = SpanId(0);

    /// A span id from its big-endian byte representation.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        SpanId(u64::from_be_bytes(bytes))
    }

    /// The big-endian byte representation of this span id.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Parses a span id from its hex rendering.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u64::from_str_radix(hex, 16).map(SpanId)
    }
}

impl From<u64> for SpanId {
    fn from(value: u64) -> Self {
        SpanId(value)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Vendor-specific trace data that rides along with the span context, as
/// defined by the W3C `tracestate` header.
///
/// Entries are ordered; mutating operations return a new `TraceState` with
/// the affected entry moved to the front, leaving the original untouched.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct TraceState(Option<Vec<(String, String)>>);

impl TraceState {
    /// An empty `TraceState`.
    pub const NONE: TraceState = TraceState(None);

    // Key grammar per https://www.w3.org/TR/trace-context/#key: a lowercase
    // identifier, optionally split by one `@` into tenant and system parts.
    fn valid_key(key: &str) -> bool {
        fn valid_part(part: &str, max_len: usize) -> bool {
            let lead = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
            let tail = |b: u8| lead(b) || matches!(b, b'_' | b'-' | b'*' | b'/');

            !part.is_empty()
                && part.len() <= max_len
                && part
                    .bytes()
                    .enumerate()
                    .all(|(i, b)| if i == 0 { lead(b) } else { tail(b) })
        }

        match key.split_once('@') {
            None => valid_part(key, 256),
            Some((tenant, system)) => valid_part(tenant, 241) && valid_part(system, 13),
        }
    }

    // Value grammar per https://www.w3.org/TR/trace-context/#value: printable
    // ascii except the `,` and `=` delimiters.
    fn valid_value(value: &str) -> bool {
        value.len() <= 256
            && value
                .bytes()
                .all(|b| (0x20..=0x7e).contains(&b) && b != b',' && b != b'=')
    }

    /// Builds a `TraceState` from key-value pairs, validating each entry.
    pub fn from_key_value<T, K, V>(entries: T) -> TraceResult<Self>
    where
        T: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        let mut validated = Vec::new();
        for (key, value) in entries {
            let (key, value) = (key.to_string(), value.to_string());
            if !TraceState::valid_key(&key) {
                return Err(TraceStateError::Key(key).into());
            }
            if !TraceState::valid_value(&value) {
                return Err(TraceStateError::Value(value).into());
            }
            validated.push((key, value));
        }

        if validated.is_empty() {
            Ok(TraceState(None))
        } else {
            Ok(TraceState(Some(validated)))
        }
    }

    /// The value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        let entries = self.0.as_deref()?;
        entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns a new `TraceState` with `key` set to `value`, at the front of
    /// the entry list. A previous entry for the same key is removed first.
    pub fn insert<K, V>(&self, key: K, value: V) -> TraceResult<TraceState>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (key, value) = (key.into(), value.into());
        if !TraceState::valid_key(&key) {
            return Err(TraceStateError::Key(key).into());
        }
        if !TraceState::valid_value(&value) {
            return Err(TraceStateError::Value(value).into());
        }

        let mut entries = self.entries_without(&key);
        entries.insert(0, (key, value));
        Ok(TraceState(Some(entries)))
    }

    /// Returns a new `TraceState` without the entry for `key`. A key that is
    /// not present leaves the state unchanged.
    pub fn delete<K: Into<String>>(&self, key: K) -> TraceResult<TraceState> {
        let key = key.into();
        if !TraceState::valid_key(&key) {
            return Err(TraceStateError::Key(key).into());
        }

        let entries = self.entries_without(&key);
        if entries.is_empty() {
            Ok(TraceState(None))
        } else {
            Ok(TraceState(Some(entries)))
        }
    }

    fn entries_without(&self, key: &str) -> Vec<(String, String)> {
        self.0
            .iter()
            .flatten()
            .filter(|(k, _)| k != key)
            .cloned()
            .collect()
    }

    /// Renders this state as a `tracestate` header value.
    pub fn header(&self) -> String {
        self.0
            .iter()
            .flatten()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromStr for TraceState {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = Vec::new();
        for member in s.split_terminator(',') {
            let (key, value) = member
                .split_once('=')
                .ok_or_else(|| TraceStateError::Entry(member.to_string()))?;
            entries.push((key.to_string(), value.to_string()));
        }

        TraceState::from_key_value(entries)
    }
}

#[derive(Error, Debug)]
enum TraceStateError {
    #[error("trace state key {0:?} does not match the W3C key grammar")]
    Key(String),

    #[error("trace state value {0:?} does not match the W3C value grammar")]
    Value(String),

    #[error("trace state entry {0:?} is not a key=value pair")]
    Entry(String),
}

impl From<TraceStateError> for TraceError {
    fn from(err: TraceStateError) -> Self {
        TraceError::Other(Box::new(err))
    }
}

/// The propagatable identity of a [`Span`]: trace id, span id, flags, and
/// trace state.
///
/// A span context stays valid after its span ends, so it can be stored in
/// links and parent references, and serialized into outgoing requests.
///
/// [`Span`]: crate::trace::Span
#[derive(Clone, Debug, PartialEq, Hash, Eq)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
    trace_state: TraceState,
}

impl SpanContext {
    /// The invalid span context: zero ids, no flags, empty state.
    pub const NONE: SpanContext = SpanContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        trace_flags: TraceFlags::NOT_SAMPLED,
        is_remote: false,
        trace_state: TraceState::NONE,
    };

    /// Returns the invalid span context.
    pub fn empty_context() -> Self {
        SpanContext::NONE
    }

    /// Construct a new `SpanContext`.
    ///
    /// Set `is_remote` when the context was deserialized from an incoming
    /// request rather than created by this process.
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        is_remote: bool,
        trace_state: TraceState,
    ) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
            trace_state,
        }
    }

    /// The trace this span belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The id of this span.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The flag byte propagated with the ids.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Whether both ids are non-zero.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }

    /// Whether this context arrived from another process.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Whether the `sampled` flag is set.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// The vendor-specific trace state.
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }
}
