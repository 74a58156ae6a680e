use super::kind_mismatch;
use crate::engine::EngineState;
use crate::factory::{host_error_to_guest, rejection_to_host, Coercion};
use crate::roots::RootId;
use rquickjs::function::Args;
use rquickjs::{CatchResultExt, Ctx, Function, Promise, Value};
use std::rc::{Rc, Weak};
use tether_host::{Awaitable, HostError, HostObject, Outcome};
use tracing::{debug, warn};

host_wrapper!(PromiseWrapper => Promise);

impl PromiseWrapper {
    /// A host awaitable completed by reactions attached to the guest promise.
    pub fn from_guest<'js>(cx: &mut Coercion<'js>, promise: Promise<'js>) -> rquickjs::Result<Self> {
        let awaitable = Awaitable::pending();
        let handle = HostObject::awaitable(awaitable.clone());
        let value = promise.clone().into_value();
        let root = cx.root(&value);
        cx.register(&handle, &[root]);

        let ctx = cx.ctx().clone();
        let on_fulfilled = {
            let awaitable = awaitable.clone();
            let state = cx.weak_state();
            Function::new(ctx.clone(), move |ctx: Ctx<'js>, value: Value<'js>| {
                settle_fulfilled(ctx, &state, &awaitable, value)
            })?
        };
        let on_rejected = Function::new(ctx.clone(), move |reason: Value<'js>| {
            awaitable.reject(rejection_to_host(reason));
        })?;

        let mut args = Args::new(ctx, 2);
        args.this(promise.clone())?;
        args.push_arg(on_fulfilled)?;
        args.push_arg(on_rejected)?;
        let _: Value = promise.then()?.call_arg(args)?;
        Ok(Self::from_host(handle))
    }

    /// A guest promise settled from the awaitable's done callback.
    pub fn to_guest<'js>(&self, cx: &mut Coercion<'js>) -> rquickjs::Result<Value<'js>> {
        if let Some(origin) = cx.origin(&self.handle)? {
            return Ok(origin);
        }
        let awaitable = self
            .handle
            .as_awaitable()
            .ok_or_else(|| kind_mismatch(&self.handle, "awaitable"))?;

        let (promise, resolve, reject) = cx.ctx().promise()?;
        let resolve = cx.pin(&resolve.into_value());
        let reject = cx.pin(&reject.into_value());
        let state = cx.weak_state();
        awaitable.add_done_callback(move |outcome| settle_guest(&state, resolve, reject, outcome));

        let value = promise.into_value();
        cx.remember_host(&self.handle, &value);
        Ok(value)
    }
}

fn settle_fulfilled<'js>(
    ctx: Ctx<'js>,
    state: &Weak<EngineState>,
    awaitable: &Awaitable,
    value: Value<'js>,
) -> rquickjs::Result<()> {
    let Some(state) = state.upgrade() else {
        awaitable.reject(HostError::EngineShutDown);
        return Ok(());
    };
    let mut cx = Coercion::new(ctx, state);
    match cx.guest_to_host_or_none(value) {
        Ok(value) => {
            awaitable.resolve(value);
            Ok(())
        }
        Err(err) => {
            awaitable.reject(HostError::Type(err.to_string()));
            Err(err)
        }
    }
}

fn settle<'js>(
    cx: &mut Coercion<'js>,
    resolve: RootId,
    reject: RootId,
    outcome: Outcome,
) -> rquickjs::Result<()> {
    let (settle, argument) = match outcome {
        Ok(value) => (cx.restore(resolve)?, cx.host_to_guest(&value)?),
        Err(err) => (cx.restore(reject)?, host_error_to_guest(cx.ctx(), &err)?),
    };
    if let Some(settle) = settle.into_function() {
        let _: Value = settle.call((argument,))?;
    }
    Ok(())
}

fn settle_guest(state: &Weak<EngineState>, resolve: RootId, reject: RootId, outcome: Outcome) {
    let Some(state) = state.upgrade() else {
        debug!("engine gone before awaitable settled");
        return;
    };
    let engine = Rc::clone(&state);
    let result = state.enter(|ctx| {
        let mut cx = Coercion::new(ctx.clone(), engine);
        settle(&mut cx, resolve, reject, outcome)
            .catch(&ctx)
            .map_err(|err| err.to_string())
    });
    if let Err(err) = result {
        warn!(error = %err, "could not settle guest promise");
    }

    let mut roots = state.roots.borrow_mut();
    roots.unpin(resolve);
    roots.unpin(reject);
}
