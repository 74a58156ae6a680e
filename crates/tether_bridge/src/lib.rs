//! Guest engine bridge
//!
//! Embeds a QuickJS guest runtime in the reference-counted host runtime of
//! `tether_host`: values coerce in both directions, guest objects held by
//! host objects stay rooted exactly as long as their holders live, and guest
//! timers and promises run on the host event loop.

mod bindings;
pub mod config;
pub mod engine;
pub mod error;
pub mod factory;
mod jobs;
pub mod module;
mod realm;
pub mod roots;
pub mod timers;
pub mod wrapper;

pub use config::EngineConfig;
pub use engine::{Engine, EngineStats};
pub use error::{InitError, ScheduleError};
pub use factory::Coercion;
pub use roots::{GuestRootTable, ReconcileReport, RootId, RootStats};
pub use timers::{AsyncHandle, HandleRegistry, HandleState, TimeoutId};
pub use wrapper::{ReturnType, Wrapper};
