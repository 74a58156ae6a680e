//! Engine lifecycle
//!
//! One [`Engine`] per thread owns the guest runtime, its single context and
//! every table that refers into the guest heap. The shared part lives in
//! [`EngineState`] behind an `Rc`; host callables and guest closures only
//! ever hold a `Weak` to it, so nothing keeps the guest heap alive past
//! [`Engine`]'s `Drop`.

use crate::bindings;
use crate::config::EngineConfig;
use crate::error::InitError;
use crate::factory::{caught_to_host, Coercion};
use crate::jobs::JobQueue;
use crate::realm::Realm;
use crate::roots::{GuestRootTable, ReconcileReport, RootStats};
use crate::timers::HandleRegistry;
use crate::wrapper;
use rquickjs::context::EvalOptions;
use rquickjs::{CatchResultExt, Context, Ctx, Runtime, Value};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tether_host::{text, HostError, HostRef};
use tracing::{debug, info, warn};

thread_local! {
    static LIVE: Cell<bool> = const { Cell::new(false) };
}

pub(crate) struct EngineState {
    me: Weak<EngineState>,
    pub(crate) context: Context,
    pub(crate) realm: Realm,
    pub(crate) jobs: JobQueue,
    pub(crate) roots: RefCell<GuestRootTable>,
    pub(crate) timers: RefCell<HandleRegistry>,
    pub(crate) config: EngineConfig,
}

impl EngineState {
    pub(crate) fn reconcile(&self) -> ReconcileReport {
        self.roots.borrow_mut().reconcile()
    }

    /// Sync every linked container the host still holds with its guest twin.
    pub(crate) fn sync_linked<'js>(&self, ctx: &Ctx<'js>) {
        let holders = self.roots.borrow().linked_holders();
        if holders.is_empty() {
            return;
        }
        let Some(state) = self.me.upgrade() else {
            return;
        };
        let mut cx = Coercion::new(ctx.clone(), state);
        for holder in &holders {
            if let Err(err) = wrapper::sync_linked(&mut cx, holder).catch(ctx) {
                warn!(kind = ?holder.kind(), error = %err, "could not sync a shared container");
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub roots: RootStats,
    pub pending_timers: usize,
    pub jobs_executed: u64,
}

pub struct Engine {
    state: Rc<EngineState>,
    runtime: Runtime,
}

impl Engine {
    pub fn new() -> Result<Self, InitError> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Result<Self, InitError> {
        if LIVE.with(Cell::get) {
            return Err(InitError::AlreadyInitialized);
        }

        let runtime = Runtime::new().map_err(InitError::Runtime)?;
        if config.memory_limit > 0 {
            runtime.set_memory_limit(config.memory_limit);
        }
        if config.max_stack_size > 0 {
            runtime.set_max_stack_size(config.max_stack_size);
        }
        if config.gc_threshold > 0 {
            runtime.set_gc_threshold(config.gc_threshold);
        }

        let context = Context::full(&runtime).map_err(InitError::Context)?;
        let state = Rc::new_cyclic(|me| EngineState {
            me: me.clone(),
            context,
            realm: Realm::new(),
            jobs: JobQueue::new(),
            roots: RefCell::new(GuestRootTable::new()),
            timers: RefCell::new(HandleRegistry::new()),
            config,
        });

        let engine = Self { state, runtime };
        engine.state.enter(|ctx| bindings::install(&ctx, &engine.state))?;

        let tracker = Rc::downgrade(&engine.state);
        engine
            .runtime
            .set_host_promise_rejection_tracker(Some(Box::new(
                move |ctx, promise, reason, is_handled| {
                    if let Some(state) = tracker.upgrade() {
                        state.jobs.track(&ctx, promise, reason, is_handled);
                    }
                },
            )));

        LIVE.with(|live| live.set(true));
        info!(config = ?engine.state.config, "guest engine initialized");
        Ok(engine)
    }

    /// Evaluate `source` as a script and coerce its completion value.
    pub fn eval(&self, source: &str) -> Result<HostRef, HostError> {
        let mut options = EvalOptions::default();
        options.strict = self.state.config.strict;
        let state = Rc::clone(&self.state);

        self.state.enter(move |ctx| {
            let value: Value = ctx
                .eval_with_options(source, options)
                .catch(&ctx)
                .map_err(caught_to_host)?;
            let mut cx = Coercion::new(ctx.clone(), state);
            cx.guest_to_host_or_none(value)
                .catch(&ctx)
                .map_err(caught_to_host)
        })
    }

    /// Release the roots of dead host holders, then run the guest collector.
    pub fn collect(&self) -> ReconcileReport {
        self.state.enter(|ctx| {
            let report = self.state.reconcile();
            ctx.run_gc();
            report
        })
    }

    pub fn as_ucs4(&self, value: &HostRef) -> Result<HostRef, HostError> {
        text::as_ucs4(value)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            roots: self.state.roots.borrow().stats(),
            pending_timers: self.pending_timers(),
            jobs_executed: self.state.jobs.executed(),
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.state.timers.borrow().len()
    }

    /// Resolves once no timer is scheduled or firing.
    pub async fn timers_idle(&self) {
        let idle = self.state.timers.borrow().idle();
        while self.pending_timers() > 0 {
            idle.notified().await;
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    /// Run `f` with a coercion scope inside the guest realm.
    pub fn with_coercion<R>(&self, f: impl for<'js> FnOnce(&mut Coercion<'js>) -> R) -> R {
        let state = Rc::clone(&self.state);
        self.state.enter(move |ctx| {
            let mut cx = Coercion::new(ctx, state);
            f(&mut cx)
        })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let cancelled = self.state.timers.borrow_mut().cancel_all();
        let released = self.state.roots.borrow_mut().clear();
        self.state.jobs.clear();
        self.runtime.set_host_promise_rejection_tracker(None);
        debug!(
            timers = cancelled.len(),
            roots = released,
            "released guest references"
        );
        LIVE.with(|live| live.set(false));
        info!("guest engine shut down");
    }
}
