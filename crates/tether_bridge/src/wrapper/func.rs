use super::{kind_mismatch, sync_linked};
use crate::engine::EngineState;
use crate::factory::{caught_to_host, throw_host_error, Coercion};
use crate::roots::RootId;
use rquickjs::function::{Args, Rest};
use rquickjs::{CatchResultExt, Ctx, Error, Function, Value};
use std::rc::{Rc, Weak};
use tether_host::{HostError, HostFunction, HostObject, HostRef};
use tracing::trace;

host_wrapper! {
    /// Functions cross in both directions as callables that re-enter the
    /// other side on every call, coercing arguments and the result.
    FuncWrapper => Func
}

impl FuncWrapper {
    /// Wrap a guest function as a host callable. `this` is the object the
    /// function was read from; it stays bound for every call.
    pub fn from_guest<'js>(
        cx: &mut Coercion<'js>,
        this: Option<&Value<'js>>,
        function: Function<'js>,
    ) -> rquickjs::Result<Self> {
        let value = function.into_value();
        let callee = cx.root(&value);
        let bound = this.filter(|this| this.is_object()).map(|this| cx.root(this));

        let name = value
            .as_object()
            .and_then(|object| object.get::<_, Option<String>>("name").ok().flatten())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "anonymous".to_string());

        let state = cx.weak_state();
        let function = HostFunction::new(&name, move |args| call_guest(&state, callee, bound, args));
        let handle = HostObject::function(function);

        let mut roots = vec![callee];
        roots.extend(bound);
        cx.register(&handle, &roots);
        Ok(Self::from_host(handle))
    }

    /// A guest function that calls the host function. Functions that came
    /// from the guest project back to the original.
    pub fn to_guest<'js>(&self, cx: &mut Coercion<'js>) -> rquickjs::Result<Value<'js>> {
        if let Some(origin) = cx.origin(&self.handle)? {
            return Ok(origin);
        }
        let name = self
            .handle
            .as_function()
            .ok_or_else(|| kind_mismatch(&self.handle, "function"))?
            .name()
            .to_string();

        let handle = self.handle.clone();
        let state = cx.weak_state();
        let function = Function::new(
            cx.ctx().clone(),
            move |ctx: Ctx<'js>, Rest(args): Rest<Value<'js>>| call_host(&ctx, &state, &handle, args),
        )?
        .with_name(&name)?;
        let value = function.into_value();
        cx.remember_host(&self.handle, &value);
        Ok(value)
    }
}

fn call_guest(
    state: &Weak<EngineState>,
    callee: RootId,
    bound: Option<RootId>,
    args: &[HostRef],
) -> Result<HostRef, HostError> {
    let state = state.upgrade().ok_or(HostError::EngineShutDown)?;
    let engine = Rc::clone(&state);
    state.enter(move |ctx| {
        let mut cx = Coercion::new(ctx.clone(), engine);
        invoke(&mut cx, callee, bound, args)
            .catch(&ctx)
            .map_err(caught_to_host)
    })
}

fn invoke<'js>(
    cx: &mut Coercion<'js>,
    callee: RootId,
    bound: Option<RootId>,
    args: &[HostRef],
) -> rquickjs::Result<HostRef> {
    let function = cx
        .restore(callee)?
        .into_function()
        .ok_or_else(|| Error::new_from_js("value", "function"))?;

    let mut call = Args::new(cx.ctx().clone(), args.len());
    if let Some(this) = bound {
        call.this(cx.restore(this)?)?;
    }
    for arg in args {
        call.push_arg(cx.host_to_guest(arg)?)?;
    }
    trace!(args = args.len(), "calling guest function");
    let result: Value = function.call_arg(call)?;
    let result = cx.guest_to_host_or_none(result)?;

    // Containers passed in may have been written to by the callee.
    cx.next_pass();
    for arg in args {
        sync_linked(cx, arg)?;
    }
    Ok(result)
}

fn call_host<'js>(
    ctx: &Ctx<'js>,
    state: &Weak<EngineState>,
    handle: &HostRef,
    args: Vec<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let Some(state) = state.upgrade() else {
        return Err(throw_host_error(ctx, &HostError::EngineShutDown));
    };
    let mut cx = Coercion::new(ctx.clone(), state);
    let args = args
        .into_iter()
        .map(|arg| cx.guest_to_host_or_none(arg))
        .collect::<rquickjs::Result<Vec<_>>>()?;

    trace!(args = args.len(), "calling host function");
    let result = handle.call(&args);

    // Push host writes to shared arguments back before the guest resumes.
    cx.next_pass();
    for arg in &args {
        sync_linked(&mut cx, arg)?;
    }
    match result {
        Ok(result) => cx.host_to_guest(&result),
        Err(err) => Err(throw_host_error(ctx, &err)),
    }
}
