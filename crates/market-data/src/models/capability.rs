use serde::{Deserialize, Serialize};

use super::types::{ProviderSymbol, SourceId};

/// Machine-checkable reason for a capability that is not ok.
///
/// Program logic should branch on this, never on the free-text reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// Credential missing or provider disabled.
    ProviderUnavailable,
    /// Provider quota hit, or provider still cooling down.
    RateLimited,
    /// Payload did not have the expected shape or values.
    ParseError,
    /// Timeout, transport failure or unexpected HTTP status.
    NetworkError,
    /// No candidate symbol was known to the provider.
    NotFound,
    /// A derived indicator lacks one of its components.
    DerivedInputMissing,
    /// Inputs were present but the result is undefined (e.g. division by zero).
    InvalidValue,
    /// The ticker has no route in the routing table.
    NoRoute,
}

/// How, and whether, a ticker's value was obtained.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    pub ok: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_symbol: Option<ProviderSymbol>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tried_symbols: Vec<ProviderSymbol>,

    /// Human-readable diagnostic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<ReasonCode>,

    pub source_used: SourceId,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_stale: bool,
}

impl Capability {
    /// A successful fetch.
    pub fn available(
        source_used: SourceId,
        resolved_symbol: Option<ProviderSymbol>,
        tried_symbols: Vec<ProviderSymbol>,
    ) -> Self {
        Self {
            ok: true,
            resolved_symbol,
            tried_symbols,
            reason: None,
            reason_code: None,
            source_used,
            is_stale: false,
        }
    }

    /// A failed fetch.
    pub fn failed(
        source_used: SourceId,
        reason_code: ReasonCode,
        reason: impl Into<String>,
        tried_symbols: Vec<ProviderSymbol>,
    ) -> Self {
        Self {
            ok: false,
            resolved_symbol: None,
            tried_symbols,
            reason: Some(reason.into()),
            reason_code: Some(reason_code),
            source_used,
            is_stale: false,
        }
    }

    pub fn with_stale(mut self, is_stale: bool) -> Self {
        self.is_stale = is_stale;
        self
    }
}
