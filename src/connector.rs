//! Drives the per-component Connect fixpoint (spec.md §4.5).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::envelope::Envelope;
use crate::error::{ErrorContext, FinamError, Phase, Result};
use crate::info::Info;
use crate::slot::{Input, Output};
use crate::time::Time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    Connecting,
    ConnectingIdle,
    Connected,
}

#[derive(Debug, Default, Clone, Copy)]
struct SlotProgress {
    info_done: bool,
    data_done: bool,
}

struct OutputEntry {
    slot: Rc<RefCell<dyn Output>>,
    info: Info,
    initial_data: Option<Envelope>,
    progress: SlotProgress,
}

struct InputEntry {
    slot: Rc<RefCell<dyn Input>>,
    desired: Info,
    prefetch_time: Option<Time>,
    progress: SlotProgress,
}

/// Owns the per-slot `infoPushed`/`dataPushed`/`infoExchanged`/`dataPulled`
/// bookkeeping for one component and runs one `tryConnect` pass at a time.
/// Monotone by construction: a `SlotProgress` flag, once set, is never
/// cleared (spec.md §8 P4).
pub struct Connector {
    component: String,
    outputs: HashMap<String, OutputEntry>,
    inputs: HashMap<String, InputEntry>,
}

impl Connector {
    pub fn new(component: impl Into<String>) -> Self {
        Connector {
            component: component.into(),
            outputs: HashMap::new(),
            inputs: HashMap::new(),
        }
    }

    /// Registers an output with the Info it will publish, and (for static
    /// or otherwise connect-time-available outputs) the one value it can
    /// push immediately.
    pub fn add_output(
        &mut self,
        name: impl Into<String>,
        slot: Rc<RefCell<dyn Output>>,
        info: Info,
        initial_data: Option<Envelope>,
    ) {
        self.outputs.insert(
            name.into(),
            OutputEntry {
                slot,
                info,
                initial_data,
                progress: SlotProgress::default(),
            },
        );
    }

    /// Registers an input with the Info it wants, and (if it needs an
    /// initial value before `validate`) the time to prefetch at.
    pub fn add_input(
        &mut self,
        name: impl Into<String>,
        slot: Rc<RefCell<dyn Input>>,
        desired: Info,
        prefetch_time: Option<Time>,
    ) {
        self.inputs.insert(
            name.into(),
            InputEntry {
                slot,
                desired,
                prefetch_time,
                progress: SlotProgress::default(),
            },
        );
    }

    fn ctx(&self) -> ErrorContext {
        ErrorContext::new()
            .component(self.component.clone())
            .phase(Phase::Connect)
    }

    /// Marks every registered output's declaration window closed, so a
    /// late `>>` attempt fails `AlreadyConnecting` instead of silently
    /// attaching a target Connect has already started negotiating with.
    pub fn begin_connect(&mut self) {
        for entry in self.outputs.values_mut() {
            entry.slot.borrow_mut().begin_connect();
        }
    }

    /// Runs one `tryConnect` pass (spec.md §4.5): pushes pending Infos,
    /// exchanges pending Infos, pushes any connect-time data, attempts
    /// any pending prefetch pulls, then reports the aggregate status.
    pub fn try_connect(&mut self) -> Result<ConnectStatus> {
        let mut progressed = false;

        for (name, entry) in self.outputs.iter_mut() {
            if !entry.progress.info_done {
                entry.slot.borrow_mut().push_info(entry.info.clone())?;
                entry.progress.info_done = true;
                progressed = true;
                debug!(component = %self.component, slot = %name, "pushInfo complete");
            }
        }

        for (name, entry) in self.inputs.iter_mut() {
            if !entry.progress.info_done {
                entry.slot.borrow_mut().exchange_info(entry.desired.clone())?;
                entry.progress.info_done = true;
                progressed = true;
                debug!(component = %self.component, slot = %name, "exchangeInfo complete");
            }
        }

        for (name, entry) in self.outputs.iter_mut() {
            if entry.progress.info_done && !entry.progress.data_done {
                if let Some(data) = entry.initial_data.take() {
                    entry.slot.borrow_mut().push(data)?;
                    entry.progress.data_done = true;
                    progressed = true;
                    debug!(component = %self.component, slot = %name, "connect-time push complete");
                } else {
                    entry.progress.data_done = true;
                }
            }
        }

        for (name, entry) in self.inputs.iter_mut() {
            if entry.progress.info_done && !entry.progress.data_done {
                match entry.prefetch_time {
                    Some(time) => match entry.slot.borrow_mut().pull(time) {
                        Ok(_) => {
                            entry.progress.data_done = true;
                            progressed = true;
                            debug!(component = %self.component, slot = %name, "prefetch pull complete");
                        }
                        Err(e) if e.is_no_data() => {
                            // Expected during Connect (spec.md §7): absorbed locally,
                            // retried on the next pass.
                        }
                        Err(e) => return Err(e),
                    },
                    None => entry.progress.data_done = true,
                }
            }
        }

        let all_done = self
            .outputs
            .values()
            .all(|e| e.progress.info_done && e.progress.data_done)
            && self
                .inputs
                .values()
                .all(|e| e.progress.info_done && e.progress.data_done);

        Ok(if all_done {
            ConnectStatus::Connected
        } else if progressed {
            ConnectStatus::Connecting
        } else {
            ConnectStatus::ConnectingIdle
        })
    }

    /// Names of every slot not yet fully settled, for `ConnectStalled`
    /// reporting.
    pub fn unresolved_slots(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .outputs
            .iter()
            .filter(|(_, e)| !(e.progress.info_done && e.progress.data_done))
            .map(|(n, _)| n.clone())
            .chain(
                self.inputs
                    .iter()
                    .filter(|(_, e)| !(e.progress.info_done && e.progress.data_done))
                    .map(|(n, _)| n.clone()),
            )
            .collect();
        names.sort();
        names
    }

    /// Looks up a previously registered output slot by name, for the
    /// Composition's `>>` wiring surface.
    pub fn output(&self, name: &str) -> Option<Rc<RefCell<dyn Output>>> {
        self.outputs.get(name).map(|e| e.slot.clone())
    }

    /// Looks up a previously registered input slot by name, for the
    /// Composition's `>>` wiring surface.
    pub fn input(&self, name: &str) -> Option<Rc<RefCell<dyn Input>>> {
        self.inputs.get(name).map(|e| e.slot.clone())
    }

    pub fn connect_error(&self) -> FinamError {
        FinamError::Setup {
            ctx: self.ctx(),
            reason: format!(
                "connect fixpoint stalled with unresolved slots: {:?}",
                self.unresolved_slots()
            ),
        }
    }
}
