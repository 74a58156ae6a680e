//! Guest job queue checkpoint and unhandled rejection tracking

use crate::factory::describe_guest_error;
use rquickjs::{Ctx, Persistent, Value};
use std::cell::{Cell, RefCell};
use tracing::{trace, warn};

struct Rejection {
    promise: Persistent<Value<'static>>,
    reason: String,
}

/// Rejections are only reported if they are still unhandled once the
/// microtask queue has drained, since a handler may be attached later in
/// the same turn.
pub(crate) struct JobQueue {
    rejections: RefCell<Vec<Rejection>>,
    executed: Cell<u64>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            rejections: RefCell::new(Vec::new()),
            executed: Cell::new(0),
        }
    }

    /// Promise rejection tracker hook.
    pub fn track<'js>(&self, ctx: &Ctx<'js>, promise: Value<'js>, reason: Value<'js>, is_handled: bool) {
        let promise = Persistent::save(ctx, promise);
        if is_handled {
            self.rejections
                .borrow_mut()
                .retain(|rejection| rejection.promise != promise);
        } else {
            // Stringifying the reason may run guest code, so no borrow yet.
            let reason = describe_guest_error(&reason);
            self.rejections
                .borrow_mut()
                .push(Rejection { promise, reason });
        }
    }

    /// Drain pending guest jobs, then report what is still unhandled.
    pub fn run(&self, ctx: &Ctx<'_>) -> usize {
        let mut ran = 0;
        while ctx.execute_pending_job() {
            ran += 1;
        }
        if ran > 0 {
            trace!(jobs = ran, "drained guest job queue");
            self.executed.set(self.executed.get() + ran as u64);
        }

        let unhandled = std::mem::take(&mut *self.rejections.borrow_mut());
        for rejection in unhandled {
            warn!(reason = %rejection.reason, "unhandled promise rejection");
        }
        ran
    }

    pub fn executed(&self) -> u64 {
        self.executed.get()
    }

    /// Forget tracked rejections; their promises must not outlive the runtime.
    pub fn clear(&self) {
        self.rejections.borrow_mut().clear();
    }
}
