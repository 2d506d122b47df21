//! Advances time-stepping components in dependency order (spec.md §4.8).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::component::{Component, ComponentKind};
use crate::composition::LinkInfo;
use crate::error::{ErrorContext, FinamError, Phase, Result};
use crate::time::Time;

/// Drives `Component::update` calls across a run, respecting the
/// dependency order the composition's wiring implies, until every
/// time-stepping component has reached `end_time` (spec.md §4.8).
pub struct Scheduler<'a> {
    components: &'a mut [Component],
    index_of: HashMap<String, usize>,
    /// `deps[c]` lists the components whose Output `c` consumes through a
    /// non-delay link; `c` cannot advance past a `nextTime` any of them
    /// hasn't reached yet.
    deps: HashMap<String, Vec<String>>,
    end_time: Time,
    stop: Arc<AtomicBool>,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        components: &'a mut [Component],
        links: &[LinkInfo],
        end_time: Time,
        stop: Arc<AtomicBool>,
    ) -> Result<Self> {
        let index_of: HashMap<String, usize> = components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name().to_string(), i))
            .collect();

        check_dead_links(links)?;
        check_cycles(&index_of, links)?;

        let mut deps: HashMap<String, Vec<String>> = HashMap::new();
        for link in links {
            if link.is_delay || link.output_owner == link.input_owner {
                continue;
            }
            if !index_of.contains_key(&link.output_owner) || !index_of.contains_key(&link.input_owner)
            {
                continue;
            }
            deps.entry(link.input_owner.clone())
                .or_default()
                .push(link.output_owner.clone());
        }

        Ok(Scheduler {
            components,
            index_of,
            deps,
            end_time,
            stop,
        })
    }

    fn time_stepping_indices(&self) -> Vec<usize> {
        (0..self.components.len())
            .filter(|&i| self.components[i].kind() == ComponentKind::TimeStepping)
            .collect()
    }

    fn all_done(&self) -> bool {
        self.time_stepping_indices().iter().all(|&i| {
            self.components[i]
                .time()
                .map(|t| t >= self.end_time)
                .unwrap_or(true)
        })
    }

    /// Picks the time-stepping component with the smallest `time` (ties by
    /// registration order), then walks its non-delay upstream dependencies:
    /// if one of them is itself behind the candidate's `nextTime`, that
    /// upstream component is selected instead, and the walk repeats from
    /// there (spec.md §4.8 steps 1-3).
    fn select_next(&self) -> Option<usize> {
        let mut active = self
            .time_stepping_indices()
            .into_iter()
            .filter(|&i| {
                self.components[i]
                    .time()
                    .map(|t| t < self.end_time)
                    .unwrap_or(false)
            })
            .min_by_key(|&i| (self.components[i].time(), i))?;

        let mut visited = HashSet::new();
        loop {
            if !visited.insert(active) {
                break; // a cycle slipped past check_cycles; do not loop forever
            }
            let t_star = self.components[active].next_time();
            let name = self.components[active].name().to_string();
            let Some(upstream) = self.deps.get(&name) else {
                break;
            };
            let mut moved = false;
            for upstream_name in upstream {
                let Some(&idx) = self.index_of.get(upstream_name) else {
                    continue;
                };
                if self.components[idx].kind() != ComponentKind::TimeStepping {
                    continue;
                }
                if let (Some(t_star), Some(upstream_time)) = (t_star, self.components[idx].time())
                {
                    if upstream_time < t_star {
                        active = idx;
                        moved = true;
                        break;
                    }
                }
            }
            if !moved {
                break;
            }
        }
        Some(active)
    }

    /// Runs until every time-stepping component reaches `end_time`, or an
    /// external stop signal is observed between steps.
    pub fn run(&mut self) -> Result<()> {
        loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("scheduler stopped by external signal");
                return Ok(());
            }
            if self.all_done() {
                return Ok(());
            }
            let Some(active) = self.select_next() else {
                return Ok(());
            };
            let declared_next = self.components[active].next_time();
            debug!(component = %self.components[active].name(), "advancing");
            self.components[active].update()?;
            if let (Some(expected), Some(actual)) = (declared_next, self.components[active].time())
            {
                if actual != expected {
                    return Err(FinamError::component(
                        ErrorContext::new()
                            .component(self.components[active].name())
                            .phase(Phase::Update),
                        anyhow::anyhow!(
                            "update advanced time to {actual} but had declared nextTime {expected}"
                        ),
                    ));
                }
            }
        }
    }
}

/// A link whose upstream never pushes and whose downstream never pulls can
/// never carry data (spec.md §4.8 dead-link detection).
fn check_dead_links(links: &[LinkInfo]) -> Result<()> {
    for link in links {
        if !link.needs_push && !link.needs_pull {
            return Err(FinamError::setup(
                ErrorContext::new().phase(Phase::Connect),
                format!(
                    "DeadLink: {} -> {} never pushes and never pulls; no data would ever flow",
                    link.output_owner, link.input_owner
                ),
            ));
        }
    }
    Ok(())
}

/// spec.md §8 P5: a cycle in the dependency graph is only safe if it
/// contains at least one delay-adapter edge. Dropping every delay edge and
/// checking the remainder for cycles is equivalent to, and simpler than,
/// enumerating cycles and checking each for a delay edge directly.
fn check_cycles(index_of: &HashMap<String, usize>, links: &[LinkInfo]) -> Result<()> {
    let mut adj: HashMap<usize, Vec<usize>> = HashMap::new();
    for link in links {
        if link.is_delay || link.output_owner == link.input_owner {
            continue;
        }
        let (Some(&from), Some(&to)) =
            (index_of.get(&link.output_owner), index_of.get(&link.input_owner))
        else {
            continue;
        };
        adj.entry(from).or_default().push(to);
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit(node: usize, adj: &HashMap<usize, Vec<usize>>, marks: &mut [Mark]) -> bool {
        match marks[node] {
            Mark::Done => return false,
            Mark::InProgress => return true,
            Mark::Unvisited => {}
        }
        marks[node] = Mark::InProgress;
        if let Some(next) = adj.get(&node) {
            for &n in next {
                if visit(n, adj, marks) {
                    return true;
                }
            }
        }
        marks[node] = Mark::Done;
        false
    }

    let mut marks = vec![Mark::Unvisited; index_of.len()];
    for node in 0..marks.len() {
        if visit(node, &adj, &mut marks) {
            return Err(FinamError::setup(
                ErrorContext::new().phase(Phase::Connect),
                "dependency graph has a cycle with no delay adapter on any edge",
            ));
        }
    }
    Ok(())
}
