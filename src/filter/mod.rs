//! Filter trait and supporting declarations.
//!
//! A filter is a processing stage with zero or more input pids and zero or
//! more output pids. The session drives it through the [`Filter`]
//! callbacks:
//!
//! - `initialize` once after construction,
//! - `configure_pid` when an input pid is linked, changes, or goes away,
//! - `process` repeatedly from the scheduling loop,
//! - `process_event` for control events travelling along the links,
//! - `reconfigure_output` when a consumer proposes a new output format,
//! - `finalize` once at teardown.
//!
//! Filters never talk to each other directly: everything goes through
//! pids, properties and events.
//!
//! # Example
//!
//! ```rust,ignore
//! use pidflow::prelude::*;
//!
//! struct Passthrough {
//!     input: Option<Pid>,
//!     output: Option<Pid>,
//! }
//!
//! impl Filter for Passthrough {
//!     fn configure_pid(&mut self, ctx: &mut FilterContext<'_>, pid: &Pid, is_remove: bool) -> Result<()> {
//!         if is_remove {
//!             if let Some(out) = self.output.take() {
//!                 ctx.remove_pid(&out);
//!             }
//!             return Ok(());
//!         }
//!         let out = self.output.get_or_insert_with(|| ctx.new_pid());
//!         out.copy_properties(pid);
//!         self.input = Some(pid.clone());
//!         Ok(())
//!     }
//!
//!     fn process(&mut self, _ctx: &mut FilterContext<'_>) -> Result<ProcessStatus> {
//!         let (Some(input), Some(output)) = (&self.input, &self.output) else {
//!             return Ok(ProcessStatus::Continue);
//!         };
//!         if output.would_block() {
//!             return Ok(ProcessStatus::Continue);
//!         }
//!         match input.get_packet() {
//!             Some(pck) => {
//!                 output.send(pck)?;
//!                 input.drop_packet();
//!             }
//!             None if input.is_eos() => {
//!                 output.set_eos();
//!                 return Ok(ProcessStatus::Eos);
//!             }
//!             None => {}
//!         }
//!         Ok(ProcessStatus::Continue)
//!     }
//! }
//! ```

mod args;
mod caps;
mod context;
mod register;

pub use args::{ArgDescriptor, ArgType, FilterArgs};
pub use caps::{CapFlags, CapValue, Capability, CapsBundle, FilterCaps};
pub use context::FilterContext;
pub use register::{FilterConstructor, FilterRegister};

pub(crate) use context::ContextEffects;
#[cfg(test)]
pub(crate) use context::TestHarness;

use std::fmt;

use crate::error::{Error, Result};
use crate::event::{EventResult, FilterEvent};
use crate::pid::Pid;
use crate::property::{PropertyMap, PropertyValue};

/// Identifier of a filter instance within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(pub u32);

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Outcome of one `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// More work may follow; nothing or something was produced.
    Continue,
    /// Every output reached end of stream. The scheduler stops calling
    /// `process` until an event reactivates the filter.
    Eos,
}

/// A processing stage of the graph.
pub trait Filter: Send {
    /// Called once after construction and argument updates.
    fn initialize(&mut self, _ctx: &mut FilterContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Attach, reconfigure or detach an input pid.
    ///
    /// Returning `Ok` after calling [`Pid::negotiate_property`] defers the
    /// configuration until the producer adopted the proposal; the call is
    /// then repeated.
    fn configure_pid(&mut self, ctx: &mut FilterContext<'_>, pid: &Pid, is_remove: bool)
    -> Result<()>;

    /// Do one bounded unit of work.
    fn process(&mut self, ctx: &mut FilterContext<'_>) -> Result<ProcessStatus>;

    /// Handle a control event.
    fn process_event(&mut self, _ctx: &mut FilterContext<'_>, _event: &FilterEvent) -> EventResult {
        EventResult::Propagate
    }

    /// Adopt the properties a consumer proposed for output `pid`.
    fn reconfigure_output(
        &mut self,
        _ctx: &mut FilterContext<'_>,
        pid: &Pid,
        _proposals: &PropertyMap,
    ) -> Result<()> {
        Err(Error::NotSupported(format!(
            "output reconfiguration of {}",
            pid.id()
        )))
    }

    /// Update an undeclared argument before initialization.
    fn update_arg(&mut self, name: &str, _value: &PropertyValue) -> Result<()> {
        Err(Error::BadParam(format!("unknown argument {name}")))
    }

    /// Release resources. Called once at teardown.
    fn finalize(&mut self, _ctx: &mut FilterContext<'_>) {}
}
