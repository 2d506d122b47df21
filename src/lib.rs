//! FINAM couples independently-authored simulation components through a
//! scheduler, push/pull dataflow ports, adapters, and an iterative
//! Connect negotiation phase (spec.md §1 Overview).
//!
//! A hosted model implements [`Behavior`] and declares its ports on a
//! [`Connector`] during `initialize`; a [`Composition`] wires components
//! together with the `>>` operator, runs the Connect fixpoint, then hands
//! control to a [`Scheduler`] until the simulation's end time.

pub mod adapter;
pub mod component;
pub mod composition;
pub mod config;
pub mod connector;
pub mod envelope;
pub mod error;
pub mod grid;
pub mod info;
pub mod logging;
pub mod payload;
pub mod scheduler;
pub mod slot;
pub mod testkit;
pub mod time;
pub mod units;

pub use component::{Behavior, Component, ComponentKind, ComponentMetadata, ComponentStatus};
pub use composition::{AdapterHandle, Composition, InputHandle, LinkInfo, OutputHandle};
pub use config::{CompositionConfig, LogFileConfig, LogLevel};
pub use connector::{ConnectStatus, Connector};
pub use envelope::Envelope;
pub use error::{ErrorContext, FinamError, Phase, Result};
pub use grid::{
    AxisDirection, AxisSpec, DataLocation, GridCompat, GridSpec, StructuredGrid, StructuredKind,
};
pub use info::{Info, MaskPolicy, Reason};
pub use payload::Payload;
pub use scheduler::Scheduler;
pub use slot::{CallbackInput, CallbackOutput, Input, InputSlot, Output, OutputSlot, RequesterId};
pub use time::{Time, TimeSpan};
pub use units::{LinearUnitSystem, UnitSystem, Units};
