//! Host runtime for the tether bridge
//!
//! A small reference-counted object model (`Rc<HostObject>`), awaitables,
//! host functions and a cooperative single-threaded event loop. Liveness of
//! a host object is its `Rc` strong count; it is finalized on the last drop.

pub mod awaitable;
pub mod error;
pub mod event_loop;
pub mod function;
pub mod object;
pub mod text;

pub use awaitable::{Awaitable, Outcome};
pub use error::HostError;
pub use event_loop::{running, EventLoop, LoopHandle};
pub use function::HostFunction;
pub use object::{HostId, HostKind, HostObject, HostRef, HostValue};
