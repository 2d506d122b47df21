//! Push/pull port machinery: Output and Input slots, their callback
//! variants, and the disk-spill strategy for Output history (spec.md
//! §4.2, §4.3).

mod callback;
mod output;
mod spill;

pub mod input;

pub use callback::{CallbackInput, CallbackOutput};
pub use input::InputSlot;
pub use output::OutputSlot;
pub use spill::SpillConfig;

use std::cell::RefCell;
use std::rc::Rc;

use crate::envelope::{convert_units, Envelope};
use crate::error::Result;
use crate::grid::GridCompat;
use crate::info::Info;
use crate::time::Time;
use crate::units::UnitSystem;

/// Identifies one of an Output's targets, handed back from [`Output::chain`]
/// so the bound Input can later pass it to `get_data` as the "requester"
/// spec.md §4.2 `getData` describes, used only to track a per-target
/// watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequesterId(pub usize);

/// The push endpoint of a link (spec.md §4.2).
pub trait Output: std::fmt::Debug {
    fn name(&self) -> &str;
    fn push_info(&mut self, info: Info) -> Result<()>;
    fn push(&mut self, env: Envelope) -> Result<()>;
    fn chain(&mut self, target: Rc<RefCell<dyn Input>>) -> Result<RequesterId>;
    fn get_data(&mut self, time: Time, requester: RequesterId) -> Result<Envelope>;
    fn info(&self) -> Option<Info>;
    /// Marks the end of the slot-declaration window; `chain` after this
    /// point fails `AlreadyConnecting` (spec.md §4.2).
    fn begin_connect(&mut self);
    /// False for a pull-originating [`CallbackOutput`], which never needs
    /// an explicit `push` to answer pulls (used for dead-link detection).
    fn needs_push(&self) -> bool {
        true
    }
    /// Fires every attached target's `sourceUpdated(time)`, in insertion
    /// order, after a fresh `push` (spec.md §4.2 `notifyTargets`). The
    /// default is a no-op for slot kinds with no push-then-notify cycle
    /// of their own (`CallbackOutput`, `Adapter`); `OutputSlot` overrides
    /// it to actually walk its targets.
    fn notify_targets(&self, _time: Time) -> Result<()> {
        Ok(())
    }
}

/// The pull endpoint of a link (spec.md §4.3).
pub trait Input: std::fmt::Debug {
    fn name(&self) -> &str;
    fn bind_source(&mut self, source: Rc<RefCell<dyn Output>>, requester: RequesterId)
        -> Result<()>;
    fn exchange_info(&mut self, desired: Info) -> Result<Info>;
    fn source_updated(&mut self, time: Time) -> Result<()>;
    fn pull(&mut self, time: Time) -> Result<Envelope>;
    /// False for a push-originating [`CallbackInput`], which never calls
    /// `pull` itself (used for dead-link detection).
    fn needs_pull(&self) -> bool {
        true
    }
}

/// Binds `output` to `input`: equivalent to `output.chain(input)`, and the
/// operation behind the `>>` wiring surface (spec.md §4.7, §6).
pub fn chain(output: Rc<RefCell<dyn Output>>, input: Rc<RefCell<dyn Input>>) -> Result<()> {
    let requester = output.borrow_mut().chain(input.clone())?;
    input.borrow_mut().bind_source(output, requester)?;
    Ok(())
}

/// Applies the unit conversion and automatic grid transform a resolved
/// Info implies to a pulled envelope; shared by [`InputSlot`] and
/// [`CallbackInput`] so both honor the same Connect-negotiated Info.
pub(crate) fn apply_resolved_info(
    mut env: Envelope,
    info: Option<&Info>,
    units_system: &dyn UnitSystem,
) -> Result<Envelope> {
    let Some(info) = info else {
        return Ok(env);
    };
    if let Some(target_units) = &info.units {
        env = convert_units(&env, target_units, units_system)?;
    }
    if let Some(target_grid) = &info.grid {
        if let GridCompat::Transform {
            permutation,
            reversed,
        } = target_grid.compatibility(env.grid())
        {
            let transformed = env.payload().transform_axes(&permutation, &reversed);
            env = env.with_payload(transformed);
        }
    }
    Ok(env)
}
