//! Error taxonomy for the orchestration runtime.
//!
//! Each variant corresponds to a failure kind that the coordinator and strategy engine
//! treat differently: configuration and persistence errors abort the run and are
//! surfaced to the caller; planning errors trigger the deterministic fallback team;
//! provider and tool errors are captured per-agent and do not propagate across a
//! strategy boundary. None of these wrap `thiserror` — each implements `Display` and
//! `Error` by hand, matching the rest of the crate.

use std::error::Error;
use std::fmt;

/// Top-level error returned by coordinator-facing operations.
#[derive(Debug)]
pub enum OrchestrationError {
    /// Missing LLM profile, missing agent signer, or other startup misconfiguration.
    Configuration(String),
    /// Malformed inbound event (missing tags, unparsable addressable reference).
    Protocol(String),
    /// The request analyser's planning call failed or produced unrepairable JSON
    /// after a retry; the deterministic fallback team was used instead.
    Planning(String),
    /// An LLM provider call failed (non-2xx, timeout, transport error).
    Provider(String),
    /// A tool invocation failed; never aborts the surrounding conversation turn.
    Tool(String),
    /// A conversation-store read/write failed.
    Persistence(String),
}

impl fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestrationError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            OrchestrationError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            OrchestrationError::Planning(msg) => write!(f, "planning error: {}", msg),
            OrchestrationError::Provider(msg) => write!(f, "provider error: {}", msg),
            OrchestrationError::Tool(msg) => write!(f, "tool error: {}", msg),
            OrchestrationError::Persistence(msg) => write!(f, "persistence error: {}", msg),
        }
    }
}

impl Error for OrchestrationError {}

/// One member's failure inside a strategy that otherwise continued.
///
/// Strategies record these instead of failing the whole run, as long as the
/// strategy's own minimum-viable-output rule is still satisfied (see each
/// strategy module for its rule).
#[derive(Debug, Clone)]
pub struct PartialFailure {
    pub agent_name: String,
    pub phase: String,
    pub message: String,
}

impl fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.agent_name, self.phase, self.message)
    }
}
