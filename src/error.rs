//! Error taxonomy for the framework.
//!
//! Every fallible public operation returns [`FinamError`]. Each variant
//! carries enough context (component, slot, phase) to satisfy the
//! user-visible failure contract: component name, slot name, phase, and
//! root cause.

use std::path::PathBuf;

use thiserror::Error;

/// The phase of a run during which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Initialize,
    Connect,
    Validate,
    Update,
    Finalize,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Initialize => "initialize",
            Phase::Connect => "connect",
            Phase::Validate => "validate",
            Phase::Update => "update",
            Phase::Finalize => "finalize",
        };
        f.write_str(s)
    }
}

/// Context identifying where an error originated.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub component: Option<String>,
    pub slot: Option<String>,
    pub phase: Option<Phase>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component(mut self, name: impl Into<String>) -> Self {
        self.component = Some(name.into());
        self
    }

    pub fn slot(mut self, name: impl Into<String>) -> Self {
        self.slot = Some(name.into());
        self
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut wrote = false;
        if let Some(c) = &self.component {
            write!(f, "component={c}")?;
            wrote = true;
        }
        if let Some(s) = &self.slot {
            write!(f, "{}slot={s}", if wrote { ", " } else { "" })?;
            wrote = true;
        }
        if let Some(p) = &self.phase {
            write!(f, "{}phase={p}", if wrote { ", " } else { "" })?;
        }
        Ok(())
    }
}

/// Error taxonomy kinds from the error-handling design. Variant payloads
/// carry [`ErrorContext`] plus whatever detail is needed to explain the
/// failure.
#[derive(Debug, Error)]
pub enum FinamError {
    #[error("setup error ({ctx}): {reason}")]
    Setup { ctx: ErrorContext, reason: String },

    #[error("metadata error ({ctx}): {reason}")]
    Metadata { ctx: ErrorContext, reason: String },

    #[error(
        "connect fixpoint stalled: components {stalled:?} reported CONNECTING_IDLE \
         while not all were CONNECTED"
    )]
    ConnectStalled { stalled: Vec<String> },

    #[error("data error ({ctx}): {reason}")]
    Data { ctx: ErrorContext, reason: String },

    #[error("no data available at or before the requested time ({ctx})")]
    NoData { ctx: ErrorContext },

    #[error("component error ({ctx}): {source}")]
    Component {
        ctx: ErrorContext,
        #[source]
        source: anyhow::Error,
    },

    #[error("scratch I/O error ({ctx}) at {path}: {source}")]
    Spill {
        ctx: ErrorContext,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FinamError {
    pub fn setup(ctx: ErrorContext, reason: impl Into<String>) -> Self {
        FinamError::Setup {
            ctx,
            reason: reason.into(),
        }
    }

    pub fn metadata(ctx: ErrorContext, reason: impl Into<String>) -> Self {
        FinamError::Metadata {
            ctx,
            reason: reason.into(),
        }
    }

    pub fn no_data(ctx: ErrorContext) -> Self {
        FinamError::NoData { ctx }
    }

    pub fn data(ctx: ErrorContext, reason: impl Into<String>) -> Self {
        FinamError::Data {
            ctx,
            reason: reason.into(),
        }
    }

    pub fn component(ctx: ErrorContext, source: anyhow::Error) -> Self {
        FinamError::Component { ctx, source }
    }

    /// True for the one error kind that the Connect fixpoint absorbs
    /// locally instead of aborting the run (spec.md §7 propagation policy).
    pub fn is_no_data(&self) -> bool {
        matches!(self, FinamError::NoData { .. })
    }
}

pub type Result<T> = std::result::Result<T, FinamError>;
