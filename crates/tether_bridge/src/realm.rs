//! Scoped entry into the guest realm.
//!
//! `Context::with` locks the guest runtime and cannot be nested, yet guest
//! code calls host functions that call guest functions again. The outermost
//! entry takes the lock and publishes its context pointer; nested entries on
//! the same thread reuse it. Leaving the outermost entry runs the checkpoint:
//! the microtask queue is drained, linked containers are synced and, past the
//! configured threshold, the root table is reconciled ahead of a guest
//! collection.

use crate::engine::EngineState;
use rquickjs::{qjs, Ctx};
use std::cell::Cell;
use std::ptr::NonNull;

pub(crate) struct Realm {
    active: Cell<Option<NonNull<qjs::JSContext>>>,
}

impl Realm {
    pub fn new() -> Self {
        Self {
            active: Cell::new(None),
        }
    }

    fn open(&self, ctx: &Ctx<'_>) -> RealmGuard<'_> {
        self.active.set(Some(ctx.as_raw()));
        RealmGuard { realm: self }
    }
}

/// Clears the published context on every exit path, including unwinding.
struct RealmGuard<'a> {
    realm: &'a Realm,
}

impl Drop for RealmGuard<'_> {
    fn drop(&mut self) {
        self.realm.active.set(None);
    }
}

impl EngineState {
    /// Run `f` inside the realm.
    pub(crate) fn enter<R>(&self, f: impl for<'js> FnOnce(Ctx<'js>) -> R) -> R {
        if let Some(raw) = self.realm.active.get() {
            // SAFETY: `active` is only set while an outer frame on this thread
            // is inside `Context::with`, so the runtime lock is held and the
            // context outlives this call.
            let ctx = unsafe { Ctx::from_raw(raw) };
            return f(ctx);
        }

        self.context.with(|ctx| {
            let _scope = self.realm.open(&ctx);
            let result = f(ctx.clone());
            self.checkpoint(&ctx);
            result
        })
    }

    fn checkpoint(&self, ctx: &Ctx<'_>) {
        self.jobs.run(ctx);
        self.sync_linked(ctx);
        let threshold = self.config.reconcile_threshold;
        if threshold > 0 && self.roots.borrow().pending_registrations() >= threshold {
            self.reconcile();
            ctx.run_gc();
        }
    }
}
