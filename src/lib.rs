//! # pidflow
//!
//! A filter-graph media runtime: filters exchange packets over typed,
//! back-pressured pids, negotiate formats through pid properties, and are
//! driven by a cooperative session loop.
//!
//! ## Features
//!
//! - **Pids**: per-link packet channels with water-mark back-pressure and
//!   an ordered property map
//! - **Negotiation**: consumers propose property changes, producers adopt
//!   or refuse them before steady-state processing
//! - **Auto-wiring**: pids link to filters whose capabilities accept them
//! - **External libraries as traits**: the program stream demuxer and the
//!   encoder adapter drive parser and codec implementations supplied by the
//!   application
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pidflow::prelude::*;
//!
//! let mut registry = FilterRegistry::with_builtins();
//! registry.register(m2psdmx::register(Arc::new(MyParser)));
//!
//! let mut session = Session::new(Arc::new(registry), SessionConfig::default());
//! session.load_filter("fin", FilterArgs::new().with("src", "movie.mpg"))?;
//! session.load_filter("m2psdmx", FilterArgs::new())?;
//! session.load_filter("inspect", FilterArgs::new())?;
//!
//! let report = session.run()?;
//! for notice in session.drain_notices() {
//!     eprintln!("{notice}");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod channel;
pub mod error;
pub mod event;
pub mod filter;
pub mod filters;
pub mod format;
pub mod observability;
pub mod packet;
pub mod pid;
pub mod pool;
pub mod property;
pub mod registry;
pub mod session;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::channel::WaterMarks;
    pub use crate::error::{Error, Result};
    pub use crate::event::{EventResult, FilterEvent};
    pub use crate::filter::{
        ArgDescriptor, CapsBundle, Filter, FilterArgs, FilterCaps, FilterContext, FilterId,
        FilterRegister, ProcessStatus,
    };
    pub use crate::filters::{ffenc, fin, inspect, m2psdmx};
    pub use crate::format::{CodecId, Fraction, PixelFormat, SampleFormat, StreamType};
    pub use crate::packet::{Packet, Sap};
    pub use crate::pid::{Pid, PidId};
    pub use crate::pool::PidPool;
    pub use crate::property::{PropertyKey, PropertyMap, PropertyValue};
    pub use crate::registry::FilterRegistry;
    pub use crate::session::{Session, SessionConfig, SessionNotice, SessionReport};
    pub use std::sync::Arc;
}

pub use error::{Error, Result};
