//! Filter runtime context.
//!
//! The context is handed to every filter callback. It exposes the
//! filter's own pids and collects the requests the filter makes to the
//! graph (new pids, removals, setup failures, events); the session applies
//! them once the callback returns.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::channel::WaterMarks;
use crate::error::Error;
use crate::event::FilterEvent;
use crate::filter::FilterId;
use crate::pid::{Pid, PidId};

/// Requests collected during one callback.
#[derive(Debug, Default)]
pub(crate) struct ContextEffects {
    pub(crate) new_pids: Vec<Pid>,
    pub(crate) removed: Vec<Pid>,
    pub(crate) setup_failure: Option<Error>,
    pub(crate) events: Vec<FilterEvent>,
}

/// Runtime context for one filter callback.
pub struct FilterContext<'a> {
    id: FilterId,
    name: &'a mut String,
    inputs: &'a [Pid],
    outputs: &'a mut Vec<Pid>,
    pid_ids: &'a AtomicU32,
    marks: WaterMarks,
    effects: ContextEffects,
}

impl<'a> FilterContext<'a> {
    pub(crate) fn new(
        id: FilterId,
        name: &'a mut String,
        inputs: &'a [Pid],
        outputs: &'a mut Vec<Pid>,
        pid_ids: &'a AtomicU32,
        marks: WaterMarks,
    ) -> Self {
        Self {
            id,
            name,
            inputs,
            outputs,
            pid_ids,
            marks,
            effects: ContextEffects::default(),
        }
    }

    /// Identifier of the filter instance.
    pub fn id(&self) -> FilterId {
        self.id
    }

    /// Current filter name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Rename the filter instance (e.g. once the codec is known).
    pub fn set_name(&mut self, name: impl Into<String>) {
        *self.name = name.into();
        for pid in self.outputs.iter() {
            pid.set_filter_name(self.name.as_str());
        }
    }

    /// Input pids currently linked to this filter.
    pub fn input_pids(&self) -> &[Pid] {
        self.inputs
    }

    /// Output pids declared by this filter.
    pub fn output_pids(&self) -> &[Pid] {
        self.outputs.as_slice()
    }

    /// Declare a new output pid.
    ///
    /// The pid is linked to a consumer after the callback returns, once it
    /// carries a stream type.
    pub fn new_pid(&mut self) -> Pid {
        let id = PidId(self.pid_ids.fetch_add(1, Ordering::Relaxed));
        let pid = Pid::new(id, self.id, self.marks);
        pid.set_filter_name(self.name.as_str());
        tracing::debug!(filter = %self.name, pid = %id, "output pid created");
        self.outputs.push(pid.clone());
        self.effects.new_pids.push(pid.clone());
        pid
    }

    /// Remove one of this filter's output pids.
    pub fn remove_pid(&mut self, pid: &Pid) {
        if pid.owner() != self.id {
            tracing::warn!(filter = %self.name, pid = %pid.id(), "cannot remove a pid owned by another filter");
            return;
        }
        pid.mark_removed();
        self.outputs.retain(|p| p != pid);
        self.effects.removed.push(pid.clone());
    }

    /// Report a fatal setup error. Only the first report is kept.
    pub fn setup_failure(&mut self, error: Error) {
        if self.effects.setup_failure.is_none() {
            tracing::error!(filter = %self.name, error = %error, "setup failure");
            self.effects.setup_failure = Some(error);
        }
    }

    /// Send an event from this filter along its links.
    pub fn send_event(&mut self, event: FilterEvent) {
        self.effects.events.push(event);
    }

    pub(crate) fn into_effects(self) -> ContextEffects {
        self.effects
    }
}

/// Owns the state behind a [`FilterContext`] for unit tests of filters.
#[cfg(test)]
pub(crate) struct TestHarness {
    pub(crate) name: String,
    pub(crate) inputs: Vec<Pid>,
    pub(crate) outputs: Vec<Pid>,
    pub(crate) ids: AtomicU32,
    pub(crate) marks: WaterMarks,
    pub(crate) failures: Vec<Error>,
}

#[cfg(test)]
impl TestHarness {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            ids: AtomicU32::new(100),
            marks: WaterMarks::new(4, 1),
            failures: Vec::new(),
        }
    }

    /// A pid produced by some other filter, to feed the filter under test.
    pub(crate) fn upstream_pid(&self) -> Pid {
        let id = PidId(self.ids.fetch_add(1, Ordering::Relaxed));
        Pid::new(id, FilterId(u32::MAX), WaterMarks::new(64, 32))
    }

    /// Run `f` with a fresh context and record setup failures.
    pub(crate) fn run<R>(&mut self, f: impl FnOnce(&mut FilterContext<'_>) -> R) -> R {
        let mut ctx = FilterContext::new(
            FilterId(0),
            &mut self.name,
            &self.inputs,
            &mut self.outputs,
            &self.ids,
            self.marks,
        );
        let result = f(&mut ctx);
        let effects = ctx.into_effects();
        self.failures.extend(effects.setup_failure);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_remove_pid() {
        let mut harness = TestHarness::new("tester");
        let pid = harness.run(|ctx| {
            let pid = ctx.new_pid();
            assert_eq!(ctx.output_pids().len(), 1);
            pid
        });
        assert_eq!(pid.owner(), FilterId(0));

        harness.run(|ctx| ctx.remove_pid(&pid));
        assert!(harness.outputs.is_empty());
        assert!(pid.is_removed());
    }

    #[test]
    fn test_first_setup_failure_wins() {
        let mut harness = TestHarness::new("tester");
        harness.run(|ctx| {
            ctx.setup_failure(Error::UrlError("a".into()));
            ctx.setup_failure(Error::NonCompliantBitstream("b".into()));
        });
        assert_eq!(harness.failures.len(), 1);
        assert!(matches!(harness.failures[0], Error::UrlError(_)));
    }

    #[test]
    fn test_rename() {
        let mut harness = TestHarness::new("ffenc");
        let pid = harness.run(|ctx| ctx.new_pid());
        assert_eq!(pid.filter_name(), "ffenc");

        harness.run(|ctx| ctx.set_name("ffenc:libx264"));
        assert_eq!(harness.name, "ffenc:libx264");
        // Pid metrics follow the filter name.
        assert_eq!(pid.filter_name(), "ffenc:libx264");
    }
}
