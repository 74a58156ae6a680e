//! Guest globals backed by the host event loop
//!
//! The timer globals and `internalBinding("timers")` are native and share
//! one id pool, so `clearTimeout` and `clearInterval` are interchangeable.
//! [`PRELUDE`] self-hosts `queueMicrotask` where the engine lacks it.

use crate::engine::EngineState;
use crate::error::InitError;
use crate::roots::RootId;
use crate::timers::TimeoutId;
use rquickjs::function::{Args, IntoJsFunc, Opt, Rest};
use rquickjs::{CatchResultExt, Coerced, Ctx, Exception, Function, Object, Value};
use std::rc::{Rc, Weak};
use tracing::{error, trace, warn};

const PRELUDE: &str = r#"
(() => {
  if (typeof globalThis.queueMicrotask !== "function") {
    globalThis.queueMicrotask = function queueMicrotask(callback) {
      if (typeof callback !== "function") {
        throw new TypeError('The "callback" argument must be of type function');
      }
      Promise.resolve().then(() => callback());
    };
  }
})();
"#;

/// Register the native globals and evaluate the prelude.
pub(crate) fn install<'js>(ctx: &Ctx<'js>, state: &Rc<EngineState>) -> Result<(), InitError> {
    let globals = ctx.globals();

    let weak = Rc::downgrade(state);
    let set_timeout = move |ctx: Ctx<'js>,
                            callable: Opt<Value<'js>>,
                            delay: Opt<Coerced<f64>>,
                            Rest(args): Rest<Value<'js>>| {
        let millis = delay.0.map(|delay| delay.0).unwrap_or(0.0);
        enqueue(&ctx, &weak, callable.0, millis / 1000.0, args, false)
    };
    define(ctx, &globals, "setTimeout", set_timeout)?;

    let weak = Rc::downgrade(state);
    let set_interval = move |ctx: Ctx<'js>,
                             callable: Opt<Value<'js>>,
                             delay: Opt<Coerced<f64>>,
                             Rest(args): Rest<Value<'js>>| {
        let millis = delay.0.map(|delay| delay.0).unwrap_or(0.0);
        enqueue(&ctx, &weak, callable.0, millis / 1000.0, args, true)
    };
    define(ctx, &globals, "setInterval", set_interval)?;

    for name in ["clearTimeout", "clearInterval"] {
        let weak = Rc::downgrade(state);
        define(ctx, &globals, name, move |id: Opt<Value<'js>>| {
            cancel(&weak, id.0);
        })?;
    }

    let weak = Rc::downgrade(state);
    let internal_binding = move |ctx: Ctx<'js>, namespace: Opt<Coerced<String>>| {
        match namespace.0.as_ref().map(|namespace| namespace.0.as_str()) {
            Some("timers") => timers_binding(&ctx, &weak).map(Object::into_value),
            _ => Ok(Value::new_null(ctx.clone())),
        }
    };
    define(ctx, &globals, "internalBinding", internal_binding)?;

    ctx.eval::<(), _>(PRELUDE)
        .catch(ctx)
        .map_err(|err| InitError::SelfHosted(err.to_string()))
}

fn define<'js, P>(
    ctx: &Ctx<'js>,
    globals: &Object<'js>,
    name: &'static str,
    f: impl IntoJsFunc<'js, P> + 'js,
) -> Result<(), InitError> {
    Function::new(ctx.clone(), f)
        .and_then(|function| function.with_name(name))
        .and_then(|function| globals.set(name, function))
        .map_err(|source| InitError::Function { name, source })
}

/// The object returned by `internalBinding("timers")`. Delays are seconds.
fn timers_binding<'js>(ctx: &Ctx<'js>, state: &Weak<EngineState>) -> rquickjs::Result<Object<'js>> {
    let binding = Object::new(ctx.clone())?;
    binding.set_prototype(None)?;

    let weak = state.clone();
    let enqueue_with_delay = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, callable: Opt<Value<'js>>, delay: Opt<Coerced<f64>>| {
            let seconds = delay.0.map(|delay| delay.0).unwrap_or(0.0);
            enqueue(&ctx, &weak, callable.0, seconds, Vec::new(), false)
        },
    )?
    .with_name("enqueueWithDelay")?;
    binding.set("enqueueWithDelay", enqueue_with_delay)?;

    let weak = state.clone();
    let cancel_by_timeout_id = Function::new(ctx.clone(), move |id: Opt<Value<'js>>| {
        cancel(&weak, id.0);
    })?
    .with_name("cancelByTimeoutId")?;
    binding.set("cancelByTimeoutId", cancel_by_timeout_id)?;

    Ok(binding)
}

/// Pin the callable and its arguments and schedule it on the running loop,
/// once or, with `repeat`, until cancelled.
fn enqueue<'js>(
    ctx: &Ctx<'js>,
    state: &Weak<EngineState>,
    callable: Option<Value<'js>>,
    delay_seconds: f64,
    args: Vec<Value<'js>>,
    repeat: bool,
) -> rquickjs::Result<i32> {
    let Some(callable) = callable.filter(Value::is_function) else {
        return Err(Exception::throw_type(
            ctx,
            "The \"callback\" argument must be of type function",
        ));
    };
    let Some(state) = state.upgrade() else {
        return Err(Exception::throw_internal(ctx, "the engine has shut down"));
    };

    let (callee, arguments) = {
        let mut roots = state.roots.borrow_mut();
        let callee = roots.pin(ctx, &callable);
        let arguments: Vec<RootId> = args.iter().map(|arg| roots.pin(ctx, arg)).collect();
        (callee, arguments)
    };
    let mut pinned = Vec::with_capacity(arguments.len() + 1);
    pinned.push(callee);
    pinned.extend_from_slice(&arguments);

    let weak = Rc::downgrade(&state);
    let tick = move |id| fire(&weak, id, callee, &arguments);
    let scheduled = if repeat {
        state
            .timers
            .borrow_mut()
            .schedule_interval(delay_seconds, pinned.clone(), tick)
    } else {
        state
            .timers
            .borrow_mut()
            .schedule(delay_seconds, pinned.clone(), tick)
    };
    match scheduled {
        // Ids never exceed i32::MAX.
        Ok(id) => Ok(id.0 as i32),
        Err(err) => {
            unpin(&state, &pinned);
            Err(Exception::throw_message(ctx, &err.to_string()))
        }
    }
}

/// Cancel by guest id. Anything that is not a live int id is ignored.
fn cancel(state: &Weak<EngineState>, id: Option<Value<'_>>) {
    let Some(raw) = id.and_then(|id| id.as_int()).filter(|raw| *raw > 0) else {
        return;
    };
    let Some(state) = state.upgrade() else {
        return;
    };
    let cancelled = state.timers.borrow_mut().cancel(TimeoutId(raw as u32));
    if let Some(handle) = cancelled {
        unpin(&state, handle.roots());
    }
}

fn fire(state: &Weak<EngineState>, id: TimeoutId, callee: RootId, arguments: &[RootId]) {
    let Some(state) = state.upgrade() else {
        return;
    };
    if !state.timers.borrow_mut().mark_fired(id) {
        return;
    }
    trace!(%id, "firing timer");

    let result = state.enter(|ctx| {
        call_pinned(&ctx, &state, callee, arguments)
            .catch(&ctx)
            .map_err(|err| err.to_string())
    });
    if let Err(err) = result {
        error!(%id, error = %err, "timer callback threw");
    }

    let rearmed = state.timers.borrow_mut().rearm(id);
    match rearmed {
        Ok(true) => return,
        Ok(false) => {}
        Err(err) => warn!(%id, error = %err, "could not re-arm interval"),
    }
    let released = state.timers.borrow_mut().release(id);
    if let Some(handle) = released {
        unpin(&state, handle.roots());
    }
}

fn call_pinned<'js>(
    ctx: &Ctx<'js>,
    state: &EngineState,
    callee: RootId,
    arguments: &[RootId],
) -> rquickjs::Result<()> {
    let (function, values) = {
        let roots = state.roots.borrow();
        let function = roots.restore(ctx, callee)?;
        let values = arguments
            .iter()
            .map(|id| roots.restore(ctx, *id))
            .collect::<rquickjs::Result<Vec<_>>>()?;
        (function, values)
    };
    let Some(function) = function.into_function() else {
        return Ok(());
    };

    let mut args = Args::new(ctx.clone(), values.len());
    args.push_args(values)?;
    let _: Value = function.call_arg(args)?;
    Ok(())
}

fn unpin(state: &EngineState, roots: &[RootId]) {
    let mut table = state.roots.borrow_mut();
    for root in roots {
        table.unpin(*root);
    }
}
