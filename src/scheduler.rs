//! Per-pass ordering of view recalculation.
//!
//! Views are ranked into tiers so that everything a view reads from other
//! views (trigger sources, composite sources) is calculated first. Views of
//! one tier run in parallel on a rayon pool; a tier is finished before the
//! next one starts.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::data::buffer::ViewId;
use crate::data::view::View;

/// Scheduling rank inside one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// Plain view.
    Independent = 0,
    /// Triggers off another view.
    Triggered = 1,
    /// Derived view whose sources all have data.
    Composite = 2,
    /// Derived view with an empty source; picked up again next pass.
    Deferred = 3,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Independent, Tier::Triggered, Tier::Composite, Tier::Deferred];

    pub fn index(self) -> usize {
        self as usize
    }
}

pub fn tier_of(view: &View) -> Tier {
    if view.is_composite() {
        if view.composite_sources_ready() {
            Tier::Composite
        } else {
            Tier::Deferred
        }
    } else if view.trigger_source().is_some() {
        Tier::Triggered
    } else {
        Tier::Independent
    }
}

/// Tier assignment of one pass.
#[derive(Default)]
pub struct SchedulePlan {
    tiers: [Vec<Arc<View>>; 4],
}

impl SchedulePlan {
    pub fn tier(&self, tier: Tier) -> &[Arc<View>] {
        &self.tiers[tier.index()]
    }

    pub fn tier_of(&self, view: ViewId) -> Option<Tier> {
        Tier::ALL.into_iter().find(|t| self.tier(*t).iter().any(|v| v.id() == view))
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SchedulePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_map();
        for tier in Tier::ALL {
            let names: Vec<&str> = self.tier(tier).iter().map(|v| v.name()).collect();
            list.entry(&tier, &names);
        }
        list.finish()
    }
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    /// Views calculated per tier.
    pub per_tier: [usize; 4],
    /// Composite views whose sources were still empty.
    pub deferred: usize,
    /// View ids in completion order.
    pub completed: Vec<ViewId>,
    pub duration: Duration,
}

impl PassReport {
    pub fn total(&self) -> usize {
        self.per_tier.iter().sum()
    }

    /// Position of `view` in completion order.
    pub fn position(&self, view: ViewId) -> Option<usize> {
        self.completed.iter().position(|id| *id == view)
    }
}

/// Runs the tiered recalculation of a set of views.
pub struct DependencyScheduler {
    pool: Option<rayon::ThreadPool>,
}

impl Default for DependencyScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DependencyScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyScheduler")
            .field("threads", &self.pool.as_ref().map(|p| p.current_num_threads()))
            .finish()
    }
}

impl DependencyScheduler {
    /// Uses the global rayon pool.
    pub fn new() -> Self {
        Self { pool: None }
    }

    /// Dedicated pool of `threads` workers.
    pub fn with_threads(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("scopeview-calc-{i}"))
            .build()?;
        Ok(Self { pool: Some(pool) })
    }

    pub fn plan(&self, views: &[Arc<View>]) -> SchedulePlan {
        let mut plan = SchedulePlan::default();
        for view in views.iter().filter(|v| !v.is_closed()) {
            plan.tiers[tier_of(view).index()].push(view.clone());
        }
        plan
    }

    /// Calculate every view, tier by tier.
    pub fn run(&self, views: &[Arc<View>]) -> PassReport {
        let started = Instant::now();
        let plan = self.plan(views);
        let completed = Mutex::new(Vec::with_capacity(plan.len()));
        let mut report = PassReport::default();

        for tier in Tier::ALL {
            let members = plan.tier(tier);
            if members.is_empty() {
                continue;
            }
            let calculate = || {
                members.par_iter().for_each(|view| {
                    view.calculate();
                    completed.lock().unwrap_or_else(|p| p.into_inner()).push(view.id());
                });
            };
            // for_each returns only once every member is done
            match &self.pool {
                Some(pool) => pool.install(calculate),
                None => calculate(),
            }
            report.per_tier[tier.index()] = members.len();
        }

        report.deferred = report.per_tier[Tier::Deferred.index()];
        if report.deferred > 0 {
            log::debug!("dependency pass: {} composite view(s) deferred", report.deferred);
        }
        report.completed = completed.into_inner().unwrap_or_else(|p| p.into_inner());
        report.duration = started.elapsed();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::buffer::SampleBuffer;

    #[test]
    fn plain_and_triggered_tiers() {
        let buffer = SampleBuffer::new("a", 1.0);
        let plain = View::new("plain", buffer.clone());
        let follower = View::new("follower", buffer);
        follower.set_trigger_source(Some(&plain));
        assert_eq!(tier_of(&plain), Tier::Independent);
        assert_eq!(tier_of(&follower), Tier::Triggered);
        // a view cannot trigger off itself
        plain.set_trigger_source(Some(&plain));
        assert_eq!(tier_of(&plain), Tier::Independent);
    }

    #[test]
    fn closed_views_are_not_planned() {
        let view = View::new("v", SampleBuffer::new("a", 1.0));
        view.close();
        let scheduler = DependencyScheduler::new();
        assert!(scheduler.plan(&[view]).is_empty());
    }
}
