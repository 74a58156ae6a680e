//! Thread-local default engine
//!
//! The host-visible module surface: free functions over one engine per
//! thread, created by [`init`] and torn down by [`shutdown`].

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::InitError;
use crate::roots::ReconcileReport;
use std::cell::RefCell;
use tether_host::{text, HostError, HostObject, HostRef};

thread_local! {
    static DEFAULT: RefCell<Option<Engine>> = const { RefCell::new(None) };
}

pub fn init() -> Result<(), InitError> {
    init_with_config(EngineConfig::default())
}

pub fn init_with_config(config: EngineConfig) -> Result<(), InitError> {
    DEFAULT.with(|default| {
        let mut default = default
            .try_borrow_mut()
            .map_err(|_| InitError::AlreadyInitialized)?;
        if default.is_some() {
            return Err(InitError::AlreadyInitialized);
        }
        *default = Some(Engine::with_config(config)?);
        Ok(())
    })
}

pub fn is_initialized() -> bool {
    DEFAULT.with(|default| default.try_borrow().map_or(true, |engine| engine.is_some()))
}

fn with_engine<R>(f: impl FnOnce(&Engine) -> R) -> Result<R, HostError> {
    DEFAULT.with(|default| match default.try_borrow() {
        Ok(engine) => engine.as_ref().map(f).ok_or(HostError::EngineShutDown),
        Err(_) => Err(HostError::EngineShutDown),
    })
}

pub fn eval(source: &str) -> Result<HostRef, HostError> {
    with_engine(|engine| engine.eval(source))?
}

pub fn collect() -> Result<ReconcileReport, HostError> {
    with_engine(Engine::collect)
}

/// Needs no engine; host strings are already code points.
pub fn as_ucs4(value: &HostRef) -> Result<HostRef, HostError> {
    text::as_ucs4(value)
}

/// The null sentinel guest `null` coerces to.
pub fn null() -> HostRef {
    HostObject::null()
}

/// Drop the default engine. Returns false if there was none, or if it is
/// in use further up the stack.
pub fn shutdown() -> bool {
    let engine = DEFAULT.with(|default| {
        default
            .try_borrow_mut()
            .ok()
            .and_then(|mut default| default.take())
    });
    engine.is_some()
}
