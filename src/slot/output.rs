//! Standard Output slot: history, notification, watermarks, spill
//! (spec.md §4.2).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{trace, warn};

use super::spill::{SpillConfig, SpillFile};
use super::{Input, Output, RequesterId};
use crate::envelope::Envelope;
use crate::error::{ErrorContext, FinamError, Phase, Result};
use crate::info::Info;
use crate::time::Time;

/// One history entry: either still in memory, or spilled to disk at the
/// given spill-file index.
#[derive(Debug, Clone)]
enum Entry {
    Memory(Envelope),
    Spilled { time: Time, index: usize },
}

impl Entry {
    fn time(&self) -> Time {
        match self {
            Entry::Memory(e) => e.time(),
            Entry::Spilled { time, .. } => *time,
        }
    }
}

#[derive(Debug)]
pub struct OutputSlot {
    name: String,
    info: Option<Info>,
    static_output: bool,
    pushed_once: bool,
    connecting_begun: bool,
    history: Vec<Entry>,
    targets: Vec<Rc<RefCell<dyn Input>>>,
    watermarks: HashMap<usize, Time>,
    memory_bytes: u64,
    memory_limit: Option<u64>,
    spill: Option<(SpillFile, u64)>, // file + configured byte limit
    spill_config: Option<SpillConfig>,
}

impl OutputSlot {
    pub fn new(name: impl Into<String>) -> Self {
        OutputSlot {
            name: name.into(),
            info: None,
            static_output: false,
            pushed_once: false,
            connecting_begun: false,
            history: Vec::new(),
            targets: Vec::new(),
            watermarks: HashMap::new(),
            memory_bytes: 0,
            memory_limit: None,
            spill: None,
            spill_config: None,
        }
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.static_output = is_static;
        self
    }

    pub fn with_spill_config(mut self, config: SpillConfig) -> Self {
        self.memory_limit = Some(config.byte_limit);
        self.spill_config = Some(config);
        self
    }

    fn ctx(&self) -> ErrorContext {
        ErrorContext::new().slot(self.name.clone())
    }

    fn min_required_watermark(&self) -> Option<Time> {
        if self.targets.is_empty() {
            return None;
        }
        self.targets
            .iter()
            .enumerate()
            .map(|(i, _)| self.watermarks.get(&i).copied())
            .min()
            .flatten()
    }

    /// Drops/spills entries older than every target's last pull, per the
    /// Output-history retention invariant.
    fn compact(&mut self) -> Result<()> {
        let Some(min_watermark) = self.min_required_watermark() else {
            return Ok(());
        };
        // Keep the oldest entry that is <= min_watermark (it may still be
        // asked for), drop everything strictly older than it.
        let keep_from = self
            .history
            .iter()
            .rposition(|e| e.time() <= min_watermark)
            .unwrap_or(0);
        if keep_from > 0 {
            self.history.drain(0..keep_from);
        }
        self.maybe_spill()
    }

    fn maybe_spill(&mut self) -> Result<()> {
        let Some(limit) = self.memory_limit else {
            return Ok(());
        };
        if self.memory_bytes <= limit {
            return Ok(());
        }
        let Some(config) = self.spill_config.clone() else {
            return Err(FinamError::data(
                self.ctx().phase(Phase::Update),
                "OutOfRange: memory limit exceeded with no spill directory configured",
            ));
        };
        if self.spill.is_none() {
            self.spill = Some((SpillFile::create(&config.directory, &self.name)?, config.byte_limit));
        }
        // Spill from the oldest in-memory entry until back under budget,
        // but never spill the single most recent entry (it is almost
        // always about to be pulled again).
        while self.memory_bytes > limit && self.history.len() > 1 {
            if let Entry::Memory(env) = &self.history[0] {
                let bytes = env.payload().byte_size() as u64;
                let (spill_file, _) = self.spill.as_mut().unwrap();
                spill_file.append(env)?;
                let index = spill_file.len() - 1;
                let time = env.time();
                self.history[0] = Entry::Spilled { time, index };
                self.memory_bytes = self.memory_bytes.saturating_sub(bytes);
            } else {
                break;
            }
        }
        Ok(())
    }

    fn resolve(&mut self, entry: &Entry) -> Result<Envelope> {
        match entry {
            Entry::Memory(e) => Ok(e.clone()),
            Entry::Spilled { index, .. } => {
                let (spill_file, _) = self
                    .spill
                    .as_mut()
                    .expect("spilled entry implies a spill file");
                spill_file.read(*index)
            }
        }
    }
}

impl Output for OutputSlot {
    fn name(&self) -> &str {
        &self.name
    }

    fn push_info(&mut self, info: Info) -> Result<()> {
        if let Some(existing) = &self.info {
            if existing.is_complete() && info.is_complete() && existing != &info {
                return Err(FinamError::metadata(
                    self.ctx().phase(Phase::Connect),
                    "pushInfo conflicts with a previously published Info",
                ));
            }
        }
        self.info = Some(match &self.info {
            Some(existing) => existing.merge(&info),
            None => info,
        });
        Ok(())
    }

    fn push(&mut self, env: Envelope) -> Result<()> {
        if self.static_output && self.pushed_once {
            return Err(FinamError::data(
                self.ctx().phase(Phase::Update),
                "static output accepts exactly one push",
            ));
        }
        if let Some(last) = self.history.last() {
            let last_time = last.time();
            let regressed = if self.pushed_once {
                env.time() <= last_time
            } else {
                env.time() < last_time
            };
            if regressed {
                return Err(FinamError::data(
                    self.ctx().phase(Phase::Update),
                    format!(
                        "TimeRegress: pushed time {} is not strictly later than previous {}",
                        env.time(),
                        last_time
                    ),
                ));
            }
            if let Entry::Memory(prev) = last {
                if prev.aliases(&env) {
                    return Err(FinamError::data(
                        self.ctx().phase(Phase::Update),
                        "AliasedBuffer: pushed payload shares memory with the previous push",
                    ));
                }
            }
        }
        self.memory_bytes += env.payload().byte_size() as u64;
        self.history.push(Entry::Memory(env));
        self.pushed_once = true;
        self.maybe_spill()?;
        Ok(())
    }

    fn chain(&mut self, target: Rc<RefCell<dyn Input>>) -> Result<RequesterId> {
        if self.connecting_begun {
            return Err(FinamError::setup(
                self.ctx().phase(Phase::Connect),
                "AlreadyConnecting: cannot attach a new target after Connect has begun",
            ));
        }
        let id = RequesterId(self.targets.len());
        self.targets.push(target);
        Ok(id)
    }

    fn get_data(&mut self, time: Time, requester: RequesterId) -> Result<Envelope> {
        if self.static_output {
            let entry = self.history.first().cloned().ok_or_else(|| {
                FinamError::no_data(self.ctx().phase(Phase::Update))
            })?;
            return self.resolve(&entry);
        }
        let idx = self
            .history
            .iter()
            .rposition(|e| e.time() <= time)
            .ok_or_else(|| FinamError::no_data(self.ctx().phase(Phase::Update)))?;
        let entry = self.history[idx].clone();
        let result = self.resolve(&entry)?;
        self.watermarks.insert(requester.0, time);
        self.compact()?;
        Ok(result)
    }

    fn info(&self) -> Option<Info> {
        self.info.clone()
    }

    fn begin_connect(&mut self) {
        self.connecting_begun = true;
    }

    /// Fires every target's `sourceUpdated` in insertion order (spec.md
    /// §4.2 `notifyTargets`). All notifications for one push complete
    /// before this returns, matching the single-threaded cooperative
    /// ordering guarantee in spec.md §5.
    fn notify_targets(&self, time: Time) -> Result<()> {
        for target in &self.targets {
            trace!(slot = %self.name, %time, "notifying target");
            if let Err(e) = target.borrow_mut().source_updated(time) {
                warn!(slot = %self.name, error = %e, "target failed to handle sourceUpdated");
                return Err(e);
            }
        }
        Ok(())
    }
}

impl OutputSlot {
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }
}
