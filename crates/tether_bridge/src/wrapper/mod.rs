//! Value wrappers
//!
//! One wrapper per coercible kind. Each owns exactly one host object and
//! knows how to project it into the guest. [`Wrapper`] is the closed set the
//! coercion factory dispatches over.
//!
//! Lists and dicts are shared rather than copied: each one that crosses the
//! boundary is linked to a single guest twin, and [`sync_linked`] merges
//! writes from either side into the other. Keys the host changed since the
//! last sync win; everything else is read back from the guest.

/// Declares a wrapper struct around one host handle with the accessors every
/// variant shares.
macro_rules! host_wrapper {
    ($(#[$meta:meta])* $name:ident => $tag:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            handle: tether_host::HostRef,
        }

        impl $name {
            /// Adopt an existing host object.
            pub fn from_host(handle: tether_host::HostRef) -> Self {
                Self { handle }
            }

            pub fn handle(&self) -> &tether_host::HostRef {
                &self.handle
            }

            pub fn into_handle(self) -> tether_host::HostRef {
                self.handle
            }

            pub fn return_type(&self) -> $crate::wrapper::ReturnType {
                $crate::wrapper::ReturnType::$tag
            }
        }
    };
}

mod bigint;
mod boolean;
mod date;
mod dict;
mod float;
mod func;
mod int;
mod list;
mod null;
mod promise;
mod string;

pub use self::bigint::BigIntWrapper;
pub use self::boolean::BoolWrapper;
pub use self::date::DateWrapper;
pub use self::dict::DictWrapper;
pub use self::float::FloatWrapper;
pub use self::func::FuncWrapper;
pub use self::int::{IntWrapper, MAX_SAFE_INTEGER};
pub use self::list::ListWrapper;
pub use self::null::NullWrapper;
pub use self::promise::PromiseWrapper;
pub use self::string::StrWrapper;

use crate::factory::Coercion;
use rquickjs::{Error, Value};
use tether_host::{HostKind, HostRef};

/// Fixed kind tag reported by every wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnType {
    Int,
    Float,
    Str,
    Bool,
    Null,
    BigInt,
    Date,
    List,
    Dict,
    Func,
    Promise,
}

/// Bring a linked container and its guest twin back in step. Anything else
/// is left alone.
pub(crate) fn sync_linked<'js>(cx: &mut Coercion<'js>, handle: &HostRef) -> rquickjs::Result<()> {
    if cx.snapshot(handle).is_none() {
        return Ok(());
    }
    let Some(origin) = cx.origin(handle)? else {
        return Ok(());
    };
    match handle.kind() {
        HostKind::List => {
            if let Some(array) = origin.into_array() {
                list::sync(cx, handle, &array)?;
            }
        }
        HostKind::Dict => {
            if let Some(object) = origin.into_object() {
                dict::sync(cx, handle, &object)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// The host item for a value read off `owner`, reusing `current` when the
/// guest value still corresponds to it.
fn refresh_item<'js>(
    cx: &mut Coercion<'js>,
    owner: &Value<'js>,
    guest: Value<'js>,
    current: Option<&HostRef>,
) -> rquickjs::Result<HostRef> {
    if let Some(current) = current {
        if guest.is_object() && cx.same_origin(&guest, current) {
            sync_linked(cx, current)?;
            return Ok(current.clone());
        }
    }
    let fresh = cx.property_to_host(owner, guest)?;
    match current {
        Some(current) if is_scalar(&fresh) && fresh.kind() == current.kind() && *fresh == **current => {
            Ok(current.clone())
        }
        _ => Ok(fresh),
    }
}

fn is_scalar(handle: &HostRef) -> bool {
    !matches!(
        handle.kind(),
        HostKind::List | HostKind::Dict | HostKind::Function | HostKind::Awaitable
    )
}

/// The error for a wrapper handed a host object of the wrong kind.
pub(crate) fn kind_mismatch(handle: &HostRef, expected: &'static str) -> Error {
    Error::new_into_js(handle.type_name(), expected)
}

#[derive(Debug, Clone)]
pub enum Wrapper {
    Int(IntWrapper),
    Float(FloatWrapper),
    Str(StrWrapper),
    Bool(BoolWrapper),
    Null(NullWrapper),
    BigInt(BigIntWrapper),
    Date(DateWrapper),
    List(ListWrapper),
    Dict(DictWrapper),
    Func(FuncWrapper),
    Promise(PromiseWrapper),
}

macro_rules! each_variant {
    ($value:expr, $w:ident => $body:expr) => {
        match $value {
            Wrapper::Int($w) => $body,
            Wrapper::Float($w) => $body,
            Wrapper::Str($w) => $body,
            Wrapper::Bool($w) => $body,
            Wrapper::Null($w) => $body,
            Wrapper::BigInt($w) => $body,
            Wrapper::Date($w) => $body,
            Wrapper::List($w) => $body,
            Wrapper::Dict($w) => $body,
            Wrapper::Func($w) => $body,
            Wrapper::Promise($w) => $body,
        }
    };
}

impl Wrapper {
    /// Pick the wrapper for a host object by its exact kind.
    pub fn from_host(handle: HostRef) -> Self {
        match handle.kind() {
            HostKind::None | HostKind::Null => Wrapper::Null(NullWrapper::from_host(handle)),
            HostKind::Bool => Wrapper::Bool(BoolWrapper::from_host(handle)),
            HostKind::Int => Wrapper::Int(IntWrapper::from_host(handle)),
            HostKind::BigInt => Wrapper::BigInt(BigIntWrapper::from_host(handle)),
            HostKind::Float => Wrapper::Float(FloatWrapper::from_host(handle)),
            HostKind::Str => Wrapper::Str(StrWrapper::from_host(handle)),
            HostKind::Date => Wrapper::Date(DateWrapper::from_host(handle)),
            HostKind::List => Wrapper::List(ListWrapper::from_host(handle)),
            HostKind::Dict => Wrapper::Dict(DictWrapper::from_host(handle)),
            HostKind::Function => Wrapper::Func(FuncWrapper::from_host(handle)),
            HostKind::Awaitable => Wrapper::Promise(PromiseWrapper::from_host(handle)),
        }
    }

    pub fn handle(&self) -> &HostRef {
        each_variant!(self, w => w.handle())
    }

    pub fn into_handle(self) -> HostRef {
        each_variant!(self, w => w.into_handle())
    }

    pub fn return_type(&self) -> ReturnType {
        each_variant!(self, w => w.return_type())
    }

    /// Project the wrapper's current host state into the guest.
    pub fn to_guest<'js>(&self, cx: &mut Coercion<'js>) -> rquickjs::Result<Value<'js>> {
        match self {
            Wrapper::Int(w) => w.to_guest(cx.ctx()),
            Wrapper::Float(w) => w.to_guest(cx.ctx()),
            Wrapper::Str(w) => w.to_guest(cx.ctx()),
            Wrapper::Bool(w) => w.to_guest(cx.ctx()),
            Wrapper::Null(w) => w.to_guest(cx.ctx()),
            Wrapper::BigInt(w) => w.to_guest(cx.ctx()),
            Wrapper::Date(w) => w.to_guest(cx.ctx()),
            Wrapper::List(w) => w.to_guest(cx),
            Wrapper::Dict(w) => w.to_guest(cx),
            Wrapper::Func(w) => w.to_guest(cx),
            Wrapper::Promise(w) => w.to_guest(cx),
        }
    }
}
