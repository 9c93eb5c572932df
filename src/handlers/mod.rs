//! Dispatch Router and domain handlers.
//!
//! Each client has exactly one dispatch loop ([`run`]), so one user's messages
//! are handled in arrival order and never concurrently with each other. Every
//! handler has the same shape: validate against the persistence gateway, write,
//! then push a live echo through the hub's delivery primitives. A validation
//! failure returns a [`HandlerError`] before any write happens.

mod context;
mod event;
mod follow;
mod group;
mod invitation;
mod messaging;
mod notification;
mod router;

pub use context::Context;
pub use router::{dispatch, run};

pub use crate::error::{HandlerError, HandlerResult};
