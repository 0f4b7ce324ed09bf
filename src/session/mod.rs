//! Session: owns the filter graph and drives it.
//!
//! The session is a cooperative scheduler. Each tick calls `process` on
//! every active filter in insertion order; between callbacks it settles
//! the graph:
//!
//! - pids that gained a stream type are linked to a consumer,
//! - consumers see `configure_pid` again when producer properties change,
//! - negotiation proposals are forwarded to the producer,
//! - removed pids are detached from their consumer,
//! - events queued by filters travel along the links.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut registry = FilterRegistry::with_builtins();
//! registry.register(m2psdmx::register(parser));
//! let mut session = Session::new(Arc::new(registry), SessionConfig::default());
//!
//! let src = session.load_filter("fin", FilterArgs::new().with("src", "movie.mpg"))?;
//! let dmx = session.load_filter("m2psdmx", FilterArgs::new())?;
//! let sink = session.load_filter("inspect", FilterArgs::new())?;
//! session.connect(src, dmx)?;
//! session.connect(dmx, sink)?;
//!
//! let report = session.run()?;
//! assert!(report.is_complete());
//! ```

mod config;
mod graph;
mod notice;

pub use config::SessionConfig;
pub use graph::FilterState;
pub use notice::{SessionNotice, SessionReport};

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::time::Instant;

use graph::{FilterGraph, FilterNode};

use crate::error::{Error, Result};
use crate::event::FilterEvent;
use crate::filter::{
    ContextEffects, Filter, FilterArgs, FilterContext, FilterId, FilterRegister, ProcessStatus,
};
use crate::observability;
use crate::pid::Pid;
use crate::property::PropertyMap;
use crate::registry::FilterRegistry;

/// Graph work deferred until the current callback returned.
#[derive(Debug)]
enum Pending {
    Removed(Pid),
    Event { from: FilterId, event: FilterEvent },
}

/// A running filter graph.
pub struct Session {
    registry: Arc<FilterRegistry>,
    config: SessionConfig,
    graph: FilterGraph,
    pid_ids: AtomicU32,
    pending: VecDeque<Pending>,
    notice_tx: kanal::Sender<SessionNotice>,
    notice_rx: kanal::Receiver<SessionNotice>,
    /// Link and state changes, part of the progress measure.
    transitions: u64,
    ticks: u64,
    service_errors: u64,
    retry_unlinked: bool,
    torn_down: bool,
}

impl Session {
    /// Create an empty session.
    pub fn new(registry: Arc<FilterRegistry>, config: SessionConfig) -> Self {
        observability::init_metrics();
        let (notice_tx, notice_rx) = kanal::unbounded();
        Self {
            registry,
            config,
            graph: FilterGraph::new(),
            pid_ids: AtomicU32::new(1),
            pending: VecDeque::new(),
            notice_tx,
            notice_rx,
            transitions: 0,
            ticks: 0,
            service_errors: 0,
            retry_unlinked: false,
            torn_down: false,
        }
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registry the session instantiates filters from.
    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    // ========================================================================
    // Graph construction
    // ========================================================================

    /// Instantiate a registered filter and initialize it.
    pub fn load_filter(&mut self, name: &str, args: FilterArgs) -> Result<FilterId> {
        let (register, filter) = self.registry.create(name, &args)?;
        let name = register.name().to_string();
        self.insert(name, Some(register), args, filter)
    }

    /// Add a filter instance built outside the registry.
    ///
    /// Without a register the filter never auto-wires and cannot be cloned
    /// for [`Error::RequiresNewInstance`]; use [`Session::connect`] to feed it.
    pub fn add_filter(
        &mut self,
        name: impl Into<String>,
        register: Option<Arc<FilterRegister>>,
        filter: Box<dyn Filter>,
    ) -> Result<FilterId> {
        self.insert(name.into(), register, FilterArgs::new(), filter)
    }

    fn insert(
        &mut self,
        name: String,
        register: Option<Arc<FilterRegister>>,
        args: FilterArgs,
        filter: Box<dyn Filter>,
    ) -> Result<FilterId> {
        if self.torn_down {
            return Err(Error::NotSupported("session was torn down".into()));
        }
        let id = self.graph.add(FilterNode::new(name, register, args, filter));
        tracing::debug!(session = %self.config.name, filter = %id, "filter added");
        let initialized = self
            .with_filter(id, |f, ctx| f.initialize(ctx))
            .unwrap_or(Ok(()));
        if let Err(error) = initialized {
            let setup = error.is_setup_failure();
            self.fail(id, &error, setup);
            return Err(error);
        }
        self.retry_unlinked = true;
        Ok(id)
    }

    /// Prefer linking the pids of `src` to `dst`.
    ///
    /// Explicit destinations replace capability-based auto-wiring for
    /// `src`. Cycles are rejected.
    pub fn connect(&mut self, src: FilterId, dst: FilterId) -> Result<()> {
        self.graph.connect(src, dst)?;
        self.retry_unlinked = true;
        Ok(())
    }

    /// Set properties the chain after `consumer` wants its input pids to
    /// carry, visible through [`Pid::caps_query`].
    pub fn set_destination_caps(&mut self, consumer: FilterId, caps: PropertyMap) -> Result<()> {
        let node = self
            .graph
            .node_mut(consumer)
            .ok_or_else(|| Error::BadParam(format!("unknown filter {consumer}")))?;
        node.dest_caps = caps;
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Number of filters, failed and finished ones included.
    pub fn filter_count(&self) -> usize {
        self.graph.len()
    }

    /// Current name of a filter.
    pub fn filter_name(&self, id: FilterId) -> Option<String> {
        self.graph.node(id).map(|n| n.name.clone())
    }

    /// First filter with the given name.
    pub fn find_filter(&self, name: &str) -> Option<FilterId> {
        self.graph.find(name)
    }

    /// Scheduling state of a filter.
    pub fn filter_state(&self, id: FilterId) -> Option<FilterState> {
        self.graph.node(id).map(|n| n.state)
    }

    /// Input pids linked to a filter.
    pub fn input_pids(&self, id: FilterId) -> Vec<Pid> {
        self.graph
            .node(id)
            .map(|n| n.inputs.clone())
            .unwrap_or_default()
    }

    /// Output pids of a filter.
    pub fn output_pids(&self, id: FilterId) -> Vec<Pid> {
        self.graph
            .node(id)
            .map(|n| n.outputs.clone())
            .unwrap_or_default()
    }

    /// Ticks performed since the session started.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Receiver of lifecycle notices.
    pub fn notices(&self) -> kanal::Receiver<SessionNotice> {
        self.notice_rx.clone()
    }

    /// Take every notice published so far.
    pub fn drain_notices(&self) -> Vec<SessionNotice> {
        let mut notices = Vec::new();
        while let Ok(Some(notice)) = self.notice_rx.try_recv() {
            notices.push(notice);
        }
        notices
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Run one tick. Returns whether anything progressed.
    pub fn run_once(&mut self) -> bool {
        let before = self.activity();
        self.settle();
        for id in self.graph.ids() {
            if self.filter_state(id) != Some(FilterState::Active) {
                continue;
            }
            let start = Instant::now();
            let Some(result) = self.with_filter(id, |f, ctx| f.process(ctx)) else {
                continue;
            };
            let name = self.filter_name(id).unwrap_or_default();
            observability::record_process_call(&self.config.name, &name, start.elapsed());
            match result {
                Ok(ProcessStatus::Continue) => {}
                Ok(ProcessStatus::Eos) => self.finish(id),
                Err(error) if error.is_transient() => {
                    self.service_errors += 1;
                    observability::record_service_error(&self.config.name, &name);
                    tracing::warn!(
                        session = %self.config.name,
                        filter = %name,
                        error = %error,
                        "service error"
                    );
                }
                Err(error) => {
                    let setup = error.is_setup_failure();
                    self.fail(id, &error, setup);
                }
            }
            self.settle();
        }
        self.ticks += 1;
        self.activity() != before
    }

    /// Run until every filter finished or failed, nothing progressed for
    /// `idle_tick_limit` ticks, or `max_ticks` was reached.
    pub fn run(&mut self) -> Result<SessionReport> {
        if self.torn_down {
            return Err(Error::NotSupported("session was torn down".into()));
        }
        let span = self
            .config
            .tracing
            .session_spans
            .then(|| observability::span_session(&self.config.name));
        let _entered = span.as_ref().map(|s| s.enter());

        let mut report = SessionReport::default();
        let mut idle = 0u32;
        while self.has_active() {
            if self.config.max_ticks.is_some_and(|max| report.ticks >= max) {
                tracing::debug!(session = %self.config.name, "tick limit reached");
                break;
            }
            report.ticks += 1;
            if self.run_once() {
                idle = 0;
                continue;
            }
            idle += 1;
            if idle >= self.config.idle_tick_limit {
                tracing::warn!(
                    session = %self.config.name,
                    ticks = report.ticks,
                    "no progress, stopping"
                );
                report.stalled = true;
                break;
            }
        }

        for node in self.graph.nodes() {
            let list = match node.state {
                FilterState::Active => &mut report.active,
                FilterState::Finished => &mut report.finished,
                FilterState::Failed => &mut report.failed,
            };
            list.push(node.name.clone());
        }
        report.service_errors = self.service_errors;
        tracing::info!(
            session = %self.config.name,
            ticks = report.ticks,
            finished = report.finished.len(),
            failed = report.failed.len(),
            "session run done"
        );
        Ok(report)
    }

    fn has_active(&self) -> bool {
        self.graph
            .nodes()
            .any(|n| n.state == FilterState::Active && !n.finalized)
    }

    /// Progress measure: changes whenever a packet moves, a property
    /// changes or a filter changes state.
    fn activity(&self) -> u64 {
        let mut total = self.transitions;
        for node in self.graph.nodes() {
            for pid in &node.outputs {
                let stats = pid.stats();
                total += stats.packets_sent + stats.packets_dropped + stats.packets_discarded;
                total += pid.version() + u64::from(pid.eos_signaled());
            }
        }
        total
    }

    fn finish(&mut self, id: FilterId) {
        let Some(node) = self.graph.node_mut(id) else {
            return;
        };
        if node.state != FilterState::Active {
            return;
        }
        node.state = FilterState::Finished;
        let filter = node.name.clone();
        self.transitions += 1;
        observability::trace_eos(&self.config.name, &filter);
        self.notify(SessionNotice::FilterEos { filter });
    }

    fn fail(&mut self, id: FilterId, error: &Error, setup: bool) {
        let Some(node) = self.graph.node_mut(id) else {
            return;
        };
        if node.state == FilterState::Failed {
            return;
        }
        node.state = FilterState::Failed;
        for pid in &node.outputs {
            pid.set_eos();
        }
        let filter = node.name.clone();
        self.transitions += 1;
        observability::trace_error(&self.config.name, &filter, error);
        let error = error.to_string();
        self.notify(if setup {
            SessionNotice::SetupFailure { filter, error }
        } else {
            SessionNotice::FilterFailed { filter, error }
        });
    }

    fn notify(&self, notice: SessionNotice) {
        if self.notice_tx.send(notice).is_err() {
            tracing::debug!(session = %self.config.name, "notice channel closed");
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Send PLAY upstream from every sink.
    pub fn play(&mut self, start_range: f64) {
        self.settle();
        for sink in self.sinks() {
            self.send_event(sink, FilterEvent::play(start_range));
        }
    }

    /// Send STOP upstream from every sink.
    pub fn stop(&mut self) {
        self.settle();
        for sink in self.sinks() {
            self.send_event(sink, FilterEvent::Stop);
        }
    }

    /// Send an event from `from` along its links: upstream events reach the
    /// producers of its inputs, downstream events the consumers of its
    /// outputs. Each handler may cancel further propagation.
    pub fn send_event(&mut self, from: FilterId, event: FilterEvent) {
        self.settle();
        self.propagate(from, &event);
        self.settle();
    }

    fn sinks(&self) -> Vec<FilterId> {
        self.graph
            .ids()
            .into_iter()
            .filter(|&id| {
                self.graph.node(id).is_some_and(|n| {
                    n.is_live() && !n.inputs.is_empty() && n.outputs.is_empty()
                })
            })
            .collect()
    }

    fn propagate(&mut self, from: FilterId, event: &FilterEvent) {
        let targets = if event.is_upstream() {
            self.graph.producers(from)
        } else {
            self.graph.consumers(from)
        };
        for target in targets {
            self.deliver(target, event);
        }
    }

    fn deliver(&mut self, target: FilterId, event: &FilterEvent) {
        if !self.graph.node(target).is_some_and(FilterNode::is_live) {
            return;
        }
        let Some(result) = self.with_filter(target, |f, ctx| f.process_event(ctx, event)) else {
            return;
        };
        tracing::trace!(filter = %target, event = %event, cancelled = result.is_cancelled(), "event delivered");
        if let Some(node) = self.graph.node_mut(target) {
            if node.state == FilterState::Finished {
                tracing::debug!(filter = %node.name, event = %event, "filter reactivated");
                node.state = FilterState::Active;
                self.transitions += 1;
            }
        }
        if !result.is_cancelled() {
            self.propagate(target, event);
        }
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    /// Run one callback of filter `id` with a fresh context, then queue the
    /// requests it made. `None` when the filter is unknown or busy.
    fn with_filter<R>(
        &mut self,
        id: FilterId,
        f: impl FnOnce(&mut dyn Filter, &mut FilterContext<'_>) -> R,
    ) -> Option<R> {
        let marks = self.config.pid_buffer;
        let node = self.graph.node_mut(id)?;
        let mut filter = node.filter.take()?;
        let span = self
            .config
            .tracing
            .filter_spans
            .then(|| observability::span_filter(&self.config.name, &node.name));
        let _entered = span.as_ref().map(|s| s.enter());

        let (result, effects) = {
            let mut ctx = FilterContext::new(
                id,
                &mut node.name,
                &node.inputs,
                &mut node.outputs,
                &self.pid_ids,
                marks,
            );
            let result = f(filter.as_mut(), &mut ctx);
            (result, ctx.into_effects())
        };
        node.filter = Some(filter);
        self.apply_effects(id, effects);
        Some(result)
    }

    fn apply_effects(&mut self, id: FilterId, effects: ContextEffects) {
        for pid in &effects.new_pids {
            tracing::trace!(filter = %id, pid = %pid.id(), "pid declared");
        }
        self.pending
            .extend(effects.removed.into_iter().map(Pending::Removed));
        self.pending.extend(
            effects
                .events
                .into_iter()
                .map(|event| Pending::Event { from: id, event }),
        );
        if let Some(error) = effects.setup_failure {
            let name = self.filter_name(id).unwrap_or_default();
            observability::record_setup_failure(&self.config.name, &name);
            self.fail(id, &error, true);
        }
    }

    // ========================================================================
    // Linking
    // ========================================================================

    /// Apply deferred work and link pids until nothing changes.
    fn settle(&mut self) {
        for _ in 0..self.config.max_configure_rounds {
            let mut changed = false;
            while let Some(pending) = self.pending.pop_front() {
                changed = true;
                match pending {
                    Pending::Removed(pid) => self.detach(&pid, true),
                    Pending::Event { from, event } => self.propagate(from, &event),
                }
            }
            changed |= self.resolve_links();
            if !changed && self.pending.is_empty() {
                return;
            }
        }
        tracing::warn!(
            session = %self.config.name,
            rounds = self.config.max_configure_rounds,
            "graph did not settle"
        );
    }

    fn resolve_links(&mut self) -> bool {
        let retry = std::mem::take(&mut self.retry_unlinked);
        let mut changed = false;
        for producer in self.graph.ids() {
            let outputs = match self.graph.node(producer) {
                Some(node) if !node.finalized => node.outputs.clone(),
                _ => continue,
            };
            for pid in outputs {
                if pid.is_removed() {
                    continue;
                }
                let version = pid.version();
                match pid.consumer() {
                    Some(consumer) => {
                        if version != pid.seen_version() {
                            pid.mark_seen(version);
                            self.reconfigure(consumer, &pid);
                            changed = true;
                        }
                    }
                    None => {
                        if pid.is_discarding() && !retry && version == pid.seen_version() {
                            continue;
                        }
                        if pid.with_properties(|p| p.stream_type()).is_none() {
                            continue;
                        }
                        changed |= self.link_pid(producer, &pid);
                    }
                }
            }
        }
        changed
    }

    fn candidates(&self, producer: FilterId, props: &PropertyMap) -> Vec<FilterId> {
        let explicit: Vec<FilterId> = self
            .graph
            .explicit_destinations(producer)
            .into_iter()
            .filter(|&id| self.graph.node(id).is_some_and(FilterNode::is_live))
            .collect();
        if !explicit.is_empty() {
            return explicit;
        }
        self.graph
            .ids()
            .into_iter()
            .filter(|&id| id != producer && !self.graph.reaches(id, producer))
            .filter(|&id| {
                self.graph.node(id).is_some_and(|n| {
                    n.is_live()
                        && n.register
                            .as_ref()
                            .is_some_and(|r| r.caps().accepts_input(props))
                })
            })
            .collect()
    }

    /// Link `pid` to the first candidate accepting it. Returns whether a
    /// link was made.
    fn link_pid(&mut self, producer: FilterId, pid: &Pid) -> bool {
        let props = pid.properties();
        for candidate in self.candidates(producer, &props) {
            match self.try_link(producer, candidate, pid) {
                Ok(()) => return true,
                Err(Error::RequiresNewInstance) => {
                    let Some(clone) = self.clone_instance(candidate) else {
                        continue;
                    };
                    match self.try_link(producer, clone, pid) {
                        Ok(()) => return true,
                        Err(error) => {
                            tracing::debug!(filter = %clone, pid = %pid.id(), error = %error, "new instance rejected pid");
                            self.retire(clone);
                        }
                    }
                }
                Err(error) => {
                    tracing::debug!(filter = %candidate, pid = %pid.id(), error = %error, "pid rejected");
                }
            }
        }
        if !pid.is_discarding() {
            let producer_name = self.filter_name(producer).unwrap_or_default();
            tracing::warn!(
                filter = %producer_name,
                pid = %pid.id(),
                "no filter accepts pid, discarding its packets"
            );
            pid.set_discard(true);
            self.notify(SessionNotice::PidUnlinked {
                pid: pid.id(),
                producer: producer_name,
            });
        }
        pid.mark_seen(pid.version());
        false
    }

    fn try_link(&mut self, producer: FilterId, consumer: FilterId, pid: &Pid) -> Result<()> {
        pid.set_caps_hints(self.destination_caps(consumer));
        self.with_filter(consumer, |f, ctx| f.configure_pid(ctx, pid, false))
            .unwrap_or_else(|| Err(Error::NotSupported(format!("{consumer} is busy"))))?;
        if !self.graph.node(consumer).is_some_and(FilterNode::is_live) {
            return Err(Error::NotSupported(format!("{consumer} failed during configure")));
        }
        if let Err(error) = self.graph.add_pid_link(producer, consumer, pid.id()) {
            self.configure_remove(consumer, pid);
            return Err(error);
        }
        pid.link_to(consumer);
        if let Some(node) = self.graph.node_mut(consumer) {
            node.inputs.push(pid.clone());
            if node.state == FilterState::Finished {
                node.state = FilterState::Active;
            }
        }
        self.transitions += 1;
        tracing::info!(
            pid = %pid.id(),
            producer = %self.filter_name(producer).unwrap_or_default(),
            consumer = %self.filter_name(consumer).unwrap_or_default(),
            "pid linked"
        );
        self.negotiate(pid);
        Ok(())
    }

    /// Forward the consumer's proposals on `pid` to its producer.
    fn negotiate(&mut self, pid: &Pid) {
        let proposals = pid.take_proposals();
        if proposals.is_empty() {
            return;
        }
        let producer = pid.owner();
        let seen = pid.seen_version();
        let result = self
            .with_filter(producer, |f, ctx| f.reconfigure_output(ctx, pid, &proposals))
            .unwrap_or_else(|| Err(Error::NotSupported(format!("{producer} is busy"))));
        let error = match result {
            Ok(()) if pid.version() != seen => {
                tracing::debug!(pid = %pid.id(), "proposals adopted");
                return;
            }
            Ok(()) => Error::NotSupported("producer kept its properties".into()),
            Err(error) => error,
        };
        let consumer = pid
            .consumer()
            .and_then(|id| self.filter_name(id))
            .unwrap_or_default();
        tracing::warn!(pid = %pid.id(), consumer = %consumer, error = %error, "negotiation failed");
        self.detach(pid, true);
        pid.set_discard(true);
        pid.mark_seen(pid.version());
        self.notify(SessionNotice::NegotiationFailed {
            pid: pid.id(),
            consumer,
        });
    }

    fn reconfigure(&mut self, consumer: FilterId, pid: &Pid) {
        if !self.graph.node(consumer).is_some_and(FilterNode::is_live) {
            return;
        }
        pid.set_caps_hints(self.destination_caps(consumer));
        let result = self
            .with_filter(consumer, |f, ctx| f.configure_pid(ctx, pid, false))
            .unwrap_or(Ok(()));
        match result {
            Ok(()) => self.negotiate(pid),
            Err(error) => {
                tracing::warn!(filter = %consumer, pid = %pid.id(), error = %error, "reconfiguration rejected, unlinking");
                self.detach(pid, false);
                pid.set_discard(true);
                pid.mark_seen(pid.version());
                self.notify(SessionNotice::PidUnlinked {
                    pid: pid.id(),
                    producer: self.filter_name(pid.owner()).unwrap_or_default(),
                });
            }
        }
    }

    /// Unlink `pid` from its consumer, optionally telling the consumer.
    fn detach(&mut self, pid: &Pid, notify_consumer: bool) {
        let Some(consumer) = pid.unlink() else {
            return;
        };
        if notify_consumer {
            self.configure_remove(consumer, pid);
        }
        if let Some(node) = self.graph.node_mut(consumer) {
            node.inputs.retain(|p| p != pid);
        }
        self.graph.remove_pid_link(pid.id());
        self.transitions += 1;
        tracing::debug!(pid = %pid.id(), filter = %consumer, "pid unlinked");
    }

    fn configure_remove(&mut self, consumer: FilterId, pid: &Pid) {
        if let Some(Err(error)) = self.with_filter(consumer, |f, ctx| f.configure_pid(ctx, pid, true)) {
            tracing::debug!(filter = %consumer, pid = %pid.id(), error = %error, "pid removal reported an error");
        }
    }

    /// Destination caps of `consumer`: single-valued input caps of its
    /// explicit destinations, overridden by caps set on the session.
    fn destination_caps(&self, consumer: FilterId) -> PropertyMap {
        let mut caps = PropertyMap::new();
        for dst in self.graph.explicit_destinations(consumer) {
            if let Some(register) = self.graph.node(dst).and_then(|n| n.register.as_ref()) {
                caps.merge(&register.caps().fixed_inputs());
            }
        }
        if let Some(node) = self.graph.node(consumer) {
            caps.merge(&node.dest_caps);
        }
        caps
    }

    /// New instance of `template`'s register with the same arguments.
    fn clone_instance(&mut self, template: FilterId) -> Option<FilterId> {
        let node = self.graph.node(template)?;
        let register = node.register.clone()?;
        let args = node.args.clone();
        let dest_caps = node.dest_caps.clone();
        let destinations = self.graph.explicit_destinations(template);

        let filter = match register.instantiate(&args) {
            Ok(filter) => filter,
            Err(error) => {
                tracing::warn!(filter = %register.name(), error = %error, "cannot create new instance");
                return None;
            }
        };
        let name = register.name().to_string();
        let id = self.insert(name, Some(register), args, filter).ok()?;
        if let Some(node) = self.graph.node_mut(id) {
            node.dest_caps = dest_caps;
        }
        for dst in destinations {
            if let Err(error) = self.graph.connect(id, dst) {
                tracing::warn!(filter = %id, error = %error, "cannot wire new instance");
            }
        }
        tracing::info!(template = %template, filter = %id, "new filter instance created");
        Some(id)
    }

    /// Finalize an instance nobody uses.
    fn retire(&mut self, id: FilterId) {
        self.with_filter(id, |f, ctx| f.finalize(ctx));
        if let Some(node) = self.graph.node_mut(id) {
            node.finalized = true;
            node.state = FilterState::Finished;
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Finalize every filter once and remove every pid.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        for id in self.graph.ids() {
            if self.graph.node(id).is_some_and(|n| !n.finalized) {
                self.with_filter(id, |f, ctx| f.finalize(ctx));
            }
            if let Some(node) = self.graph.node_mut(id) {
                node.finalized = true;
                for pid in node.outputs.drain(..) {
                    pid.mark_removed();
                    pid.unlink();
                }
                node.inputs.clear();
            }
        }
        self.pending.clear();
        tracing::info!(session = %self.config.name, ticks = self.ticks, "session torn down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.config.name)
            .field("filters", &self.graph.len())
            .field("ticks", &self.ticks)
            .finish()
    }
}
