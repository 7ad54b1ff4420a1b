//! Descriptor and signal plumbing for event-driven processes.
//!
//! The modules of this crate cover three concerns:
//!
//!  - Moving bytes and descriptors over local sockets within a deadline
//!    ([`io`], [`channel`]), built on readiness waits ([`deadline`]).
//!  - Turning asynchronous signals into callbacks run by an event loop
//!    ([`signal_bridge`]), on top of a minimal [`reactor`] abstraction.
//!  - Small wrappers for descriptor and signal housekeeping
//!    ([`fd`], [`signal`]).
//!
//! All fallible operations on descriptors report an [`Error`]
//! that names the operation and descriptor involved.

#![warn(missing_docs)]

pub use self::{
    channel::{recv_fd, send_fd},
    deadline::{DEFAULT_TIMEOUT, Deadline, Direction, wait_ready},
    error::{Error, ErrorKind, Operation, Result},
    io::{read_exact, write_exact},
    reactor::{EventPoll, Events, Reactor},
    signal_bridge::SignalBridge,
};

pub mod channel;
pub mod deadline;
pub mod error;
pub mod fd;
pub mod io;
pub mod reactor;
pub mod signal;
pub mod signal_bridge;
