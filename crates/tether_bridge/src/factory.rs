//! Coercion factory
//!
//! [`Coercion`] converts values in both directions for the duration of one
//! boundary crossing. It carries two seen-sets so that a structure reachable
//! from itself coerces to the same in-progress value instead of recursing
//! forever, and it gives wrappers access to the guest root table.
//!
//! A coercion is also one sync pass over linked containers: each container
//! is synced at most once per pass, which also stops cycles.

use crate::engine::EngineState;
use crate::roots::{RootId, Snapshot};
use crate::wrapper::{
    BigIntWrapper, BoolWrapper, DateWrapper, DictWrapper, FloatWrapper, FuncWrapper, IntWrapper,
    ListWrapper, NullWrapper, PromiseWrapper, StrWrapper, Wrapper,
};
use rquickjs::{CaughtError, Coerced, Ctx, Error, Exception, Object, Type, Value};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};
use tether_host::{HostError, HostId, HostObject, HostRef};
use tracing::trace;

pub struct Coercion<'js> {
    ctx: Ctx<'js>,
    state: Rc<EngineState>,
    host_seen: HashMap<HostId, Value<'js>>,
    guest_seen: HashMap<Value<'js>, HostRef>,
    synced: HashSet<HostId>,
}

impl<'js> Coercion<'js> {
    pub(crate) fn new(ctx: Ctx<'js>, state: Rc<EngineState>) -> Self {
        Self {
            ctx,
            state,
            host_seen: HashMap::new(),
            guest_seen: HashMap::new(),
            synced: HashSet::new(),
        }
    }

    pub fn ctx(&self) -> &Ctx<'js> {
        &self.ctx
    }

    pub(crate) fn weak_state(&self) -> Weak<EngineState> {
        Rc::downgrade(&self.state)
    }

    /// Host to guest. Never fails for a well-formed host object; errors are
    /// guest exceptions raised while building the value.
    pub fn host_to_guest(&mut self, obj: &HostRef) -> rquickjs::Result<Value<'js>> {
        if let Some(value) = self.host_seen.get(&HostObject::id(obj)) {
            return Ok(value.clone());
        }
        trace!(kind = ?obj.kind(), "host -> guest");
        Wrapper::from_host(obj.clone()).to_guest(self)
    }

    /// Guest to host. `Ok(None)` means the value's kind has no host
    /// counterpart; callers treat that as "no value".
    pub fn guest_to_host(
        &mut self,
        this: Option<&Value<'js>>,
        value: Value<'js>,
    ) -> rquickjs::Result<Option<Wrapper>> {
        if let Some(handle) = self.guest_seen.get(&value) {
            return Ok(Some(Wrapper::from_host(handle.clone())));
        }

        let kind = value.type_of();
        trace!(?kind, "guest -> host");
        let wrapper = match kind {
            Type::Uninitialized | Type::Undefined => Wrapper::Null(NullWrapper::undefined()),
            Type::Null => Wrapper::Null(NullWrapper::null()),
            Type::Bool => Wrapper::Bool(BoolWrapper::from_guest(value.as_bool().unwrap_or_default())),
            Type::Int => Wrapper::Int(IntWrapper::from_guest(value.as_int().unwrap_or_default())),
            Type::Float => Wrapper::Float(FloatWrapper::from_guest(value.as_float().unwrap_or(f64::NAN))),
            Type::String => match value.into_string() {
                Some(string) => Wrapper::Str(StrWrapper::from_guest(self, string)?),
                None => return Ok(None),
            },
            Type::BigInt => Wrapper::BigInt(BigIntWrapper::from_guest(&value)?),
            Type::Array => match value.into_array() {
                Some(array) => Wrapper::List(ListWrapper::from_guest(self, array)?),
                None => return Ok(None),
            },
            Type::Function | Type::Constructor => match value.into_function() {
                Some(function) => Wrapper::Func(FuncWrapper::from_guest(self, this, function)?),
                None => return Ok(None),
            },
            Type::Promise => match value.into_promise() {
                Some(promise) => Wrapper::Promise(PromiseWrapper::from_guest(self, promise)?),
                None => return Ok(None),
            },
            Type::Exception => match value.into_exception() {
                Some(exception) => Wrapper::Dict(DictWrapper::from_error(self, exception)?),
                None => return Ok(None),
            },
            Type::Object => {
                let Some(object) = value.into_object() else {
                    return Ok(None);
                };
                if self.is_date(&object) {
                    match DateWrapper::from_guest(&self.ctx, object.into_value()) {
                        Ok(date) => Wrapper::Date(date),
                        Err(_) => return Ok(None),
                    }
                } else {
                    Wrapper::Dict(DictWrapper::from_guest(self, object)?)
                }
            }
            Type::Symbol | Type::Module | Type::Unknown => return Ok(None),
        };
        Ok(Some(wrapper))
    }

    pub fn guest_to_host_or_none(&mut self, value: Value<'js>) -> rquickjs::Result<HostRef> {
        Ok(self
            .guest_to_host(None, value)?
            .map(Wrapper::into_handle)
            .unwrap_or_else(HostObject::none))
    }

    /// Coerce a value read off `owner`, binding functions to it.
    pub(crate) fn property_to_host(
        &mut self,
        owner: &Value<'js>,
        value: Value<'js>,
    ) -> rquickjs::Result<HostRef> {
        Ok(self
            .guest_to_host(Some(owner), value)?
            .map(Wrapper::into_handle)
            .unwrap_or_else(HostObject::none))
    }

    fn is_date(&self, object: &Object<'js>) -> bool {
        self.ctx
            .globals()
            .get::<_, Object>("Date")
            .map(|date| object.is_instance_of(&date))
            .unwrap_or(false)
    }

    pub(crate) fn remember_host(&mut self, handle: &HostRef, value: &Value<'js>) {
        self.host_seen.insert(HostObject::id(handle), value.clone());
    }

    pub(crate) fn remember_guest(&mut self, value: &Value<'js>, handle: &HostRef) {
        self.guest_seen.insert(value.clone(), handle.clone());
    }

    /// The guest object `handle` was created from, if it is still rooted.
    pub(crate) fn origin(&self, handle: &HostRef) -> rquickjs::Result<Option<Value<'js>>> {
        let roots = self.state.roots.borrow();
        match roots.origin(handle) {
            Some(id) => roots.restore(&self.ctx, id).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn root(&self, value: &Value<'js>) -> RootId {
        self.state.roots.borrow_mut().root(&self.ctx, value)
    }

    pub(crate) fn pin(&self, value: &Value<'js>) -> RootId {
        self.state.roots.borrow_mut().pin(&self.ctx, value)
    }

    pub(crate) fn register(&self, handle: &HostRef, roots: &[RootId]) {
        self.state.roots.borrow_mut().register(handle, roots);
    }

    pub(crate) fn restore(&self, id: RootId) -> rquickjs::Result<Value<'js>> {
        self.state.roots.borrow().restore(&self.ctx, id)
    }

    /// The host container already linked to guest object `value`.
    pub(crate) fn linked(&self, value: &Value<'js>) -> Option<HostRef> {
        let roots = self.state.roots.borrow();
        roots
            .find(&self.ctx, value)
            .and_then(|origin| roots.linked(origin))
    }

    /// Root `value` and link it to `handle` as its guest twin.
    pub(crate) fn link(&self, handle: &HostRef, value: &Value<'js>, snapshot: Snapshot) {
        let mut roots = self.state.roots.borrow_mut();
        let origin = roots.root(&self.ctx, value);
        roots.link(handle, origin, snapshot);
    }

    pub(crate) fn snapshot(&self, handle: &HostRef) -> Option<Snapshot> {
        self.state.roots.borrow().snapshot(handle)
    }

    pub(crate) fn set_snapshot(&self, handle: &HostRef, snapshot: Snapshot) {
        self.state.roots.borrow_mut().set_snapshot(handle, snapshot);
    }

    /// Whether `host` was coerced from the guest object `guest`.
    pub(crate) fn same_origin(&self, guest: &Value<'js>, host: &HostRef) -> bool {
        let roots = self.state.roots.borrow();
        match (roots.find(&self.ctx, guest), roots.origin(host)) {
            (Some(found), Some(origin)) => found == origin,
            _ => false,
        }
    }

    /// Claim `handle` for this sync pass. False if it was already synced.
    pub(crate) fn begin_sync(&mut self, handle: &HostRef) -> bool {
        self.synced.insert(HostObject::id(handle))
    }

    /// Start a new sync pass, after a call may have written to containers
    /// that were already synced.
    pub(crate) fn next_pass(&mut self) {
        self.synced.clear();
    }
}

/// Translate a caught guest failure into the host's raised-exception shape.
pub(crate) fn caught_to_host(caught: CaughtError<'_>) -> HostError {
    match caught {
        CaughtError::Exception(exception) => {
            let name = exception
                .as_object()
                .get::<_, Option<Coerced<String>>>("name")
                .ok()
                .flatten()
                .map(|name| name.0)
                .unwrap_or_else(|| "Error".to_string());
            HostError::Exception {
                name,
                message: exception.message().unwrap_or_default(),
                stack: exception.stack().filter(|stack| !stack.is_empty()),
            }
        }
        CaughtError::Value(value) => HostError::Exception {
            name: "Error".to_string(),
            message: describe_guest_error(&value),
            stack: None,
        },
        CaughtError::Error(error) if error.is_from_js() || error.is_into_js() => {
            HostError::Type(error.to_string())
        }
        CaughtError::Error(error) => HostError::Exception {
            name: "InternalError".to_string(),
            message: error.to_string(),
            stack: None,
        },
    }
}

/// The host error for a guest promise rejection reason.
pub(crate) fn rejection_to_host(reason: Value<'_>) -> HostError {
    match reason.as_exception() {
        Some(exception) => caught_to_host(CaughtError::Exception(exception.clone())),
        None => caught_to_host(CaughtError::Value(reason)),
    }
}

/// Best-effort one-line description of a thrown or rejected guest value.
pub(crate) fn describe_guest_error(value: &Value<'_>) -> String {
    if let Some(exception) = value.as_exception() {
        let name = exception
            .as_object()
            .get::<_, Coerced<String>>("name")
            .map(|name| name.0)
            .unwrap_or_else(|_| "Error".to_string());
        return format!("{name}: {}", exception.message().unwrap_or_default());
    }
    value
        .get::<Coerced<String>>()
        .map(|text| text.0)
        .unwrap_or_else(|_| format!("<{}>", value.type_name()))
}

/// Build the guest error object equivalent to a host error.
pub(crate) fn host_error_to_guest<'js>(
    ctx: &Ctx<'js>,
    error: &HostError,
) -> rquickjs::Result<Value<'js>> {
    let exception = Exception::from_message(ctx.clone(), &error.message())?;
    let object = exception.as_object();
    object.set("name", error.name())?;
    if let HostError::Exception {
        stack: Some(stack), ..
    } = error
    {
        object.set("stack", stack.as_str())?;
    }
    Ok(exception.into_value())
}

/// Raise a host error in the guest; the returned error propagates it.
pub(crate) fn throw_host_error(ctx: &Ctx<'_>, error: &HostError) -> Error {
    match host_error_to_guest(ctx, error) {
        Ok(value) => ctx.throw(value),
        Err(err) => err,
    }
}
