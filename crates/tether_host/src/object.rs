//! Reference-counted host objects
//!
//! Every host value lives behind an `Rc<HostObject>`. Scalars are immutable;
//! lists and dicts use interior mutability so that code holding the same
//! `HostRef` observes each other's writes, which is what lets a guest object
//! and its host mirror stay shared.

use crate::{Awaitable, HostError, HostFunction};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

pub type HostRef = Rc<HostObject>;

/// Pointer identity of a host object, stable for the object's lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(usize);

impl HostId {
    pub fn of(obj: &HostObject) -> Self {
        HostId(obj as *const HostObject as usize)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HostKind {
    None,
    Null,
    Bool,
    Int,
    BigInt,
    Float,
    Str,
    Date,
    List,
    Dict,
    Function,
    Awaitable,
}

pub enum HostValue {
    None,
    Null,
    Bool(bool),
    Int(i64),
    BigInt(BigInt),
    Float(f64),
    Str(String),
    Date(DateTime<Utc>),
    List(RefCell<Vec<HostRef>>),
    Dict(RefCell<IndexMap<String, HostRef>>),
    Function(HostFunction),
    Awaitable(Awaitable),
}

pub struct HostObject {
    value: HostValue,
}

thread_local! {
    static NONE: HostRef = Rc::new(HostObject { value: HostValue::None });
    static NULL: HostRef = Rc::new(HostObject { value: HostValue::Null });
}

impl HostObject {
    pub fn new(value: HostValue) -> HostRef {
        match value {
            HostValue::None => Self::none(),
            HostValue::Null => Self::null(),
            value => Rc::new(Self { value }),
        }
    }

    /// The host "no value" singleton.
    pub fn none() -> HostRef {
        NONE.with(Rc::clone)
    }

    /// The null sentinel singleton, distinct from `none`.
    pub fn null() -> HostRef {
        NULL.with(Rc::clone)
    }

    pub fn bool(value: bool) -> HostRef {
        Self::new(HostValue::Bool(value))
    }

    pub fn int(value: i64) -> HostRef {
        Self::new(HostValue::Int(value))
    }

    pub fn bigint(value: impl Into<BigInt>) -> HostRef {
        Self::new(HostValue::BigInt(value.into()))
    }

    pub fn float(value: f64) -> HostRef {
        Self::new(HostValue::Float(value))
    }

    pub fn string(value: impl Into<String>) -> HostRef {
        Self::new(HostValue::Str(value.into()))
    }

    pub fn date(value: DateTime<Utc>) -> HostRef {
        Self::new(HostValue::Date(value))
    }

    pub fn list(items: impl IntoIterator<Item = HostRef>) -> HostRef {
        Self::new(HostValue::List(RefCell::new(items.into_iter().collect())))
    }

    pub fn dict<K: Into<String>>(entries: impl IntoIterator<Item = (K, HostRef)>) -> HostRef {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::new(HostValue::Dict(RefCell::new(map)))
    }

    pub fn function(function: HostFunction) -> HostRef {
        Self::new(HostValue::Function(function))
    }

    pub fn awaitable(awaitable: Awaitable) -> HostRef {
        Self::new(HostValue::Awaitable(awaitable))
    }

    pub fn value(&self) -> &HostValue {
        &self.value
    }

    pub fn kind(&self) -> HostKind {
        match &self.value {
            HostValue::None => HostKind::None,
            HostValue::Null => HostKind::Null,
            HostValue::Bool(_) => HostKind::Bool,
            HostValue::Int(_) => HostKind::Int,
            HostValue::BigInt(_) => HostKind::BigInt,
            HostValue::Float(_) => HostKind::Float,
            HostValue::Str(_) => HostKind::Str,
            HostValue::Date(_) => HostKind::Date,
            HostValue::List(_) => HostKind::List,
            HostValue::Dict(_) => HostKind::Dict,
            HostValue::Function(_) => HostKind::Function,
            HostValue::Awaitable(_) => HostKind::Awaitable,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.value, HostValue::None)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.value, HostValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            HostValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Small integers only; a `BigInt` that fits still answers.
    pub fn as_int(&self) -> Option<i64> {
        match &self.value {
            HostValue::Int(i) => Some(*i),
            HostValue::BigInt(b) => b.to_i64(),
            _ => None,
        }
    }

    /// Any integer kind at full precision.
    pub fn as_integer(&self) -> Option<BigInt> {
        match &self.value {
            HostValue::Int(i) => Some(BigInt::from(*i)),
            HostValue::BigInt(b) => Some(b.clone()),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match &self.value {
            HostValue::Float(f) => Some(*f),
            HostValue::Int(i) => Some(*i as f64),
            HostValue::BigInt(b) => b.to_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self.value {
            HostValue::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&RefCell<Vec<HostRef>>> {
        match &self.value {
            HostValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&RefCell<IndexMap<String, HostRef>>> {
        match &self.value {
            HostValue::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&HostFunction> {
        match &self.value {
            HostValue::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_awaitable(&self) -> Option<&Awaitable> {
        match &self.value {
            HostValue::Awaitable(a) => Some(a),
            _ => None,
        }
    }

    /// Look up a dict entry by key.
    pub fn get(&self, key: &str) -> Option<HostRef> {
        self.as_dict()
            .and_then(|entries| entries.borrow().get(key).cloned())
    }

    /// Borrow the elements of a list.
    pub fn items(&self) -> Option<Ref<'_, Vec<HostRef>>> {
        self.as_list().map(RefCell::borrow)
    }

    pub fn call(&self, args: &[HostRef]) -> Result<HostRef, HostError> {
        match &self.value {
            HostValue::Function(f) => f.call(args),
            _ => Err(HostError::Type(format!(
                "'{}' object is not callable",
                self.type_name()
            ))),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind() {
            HostKind::None => "none",
            HostKind::Null => "null",
            HostKind::Bool => "bool",
            HostKind::Int => "int",
            HostKind::BigInt => "bigint",
            HostKind::Float => "float",
            HostKind::Str => "str",
            HostKind::Date => "date",
            HostKind::List => "list",
            HostKind::Dict => "dict",
            HostKind::Function => "function",
            HostKind::Awaitable => "awaitable",
        }
    }

    pub fn refcount(this: &HostRef) -> usize {
        Rc::strong_count(this)
    }

    pub fn id(this: &HostRef) -> HostId {
        HostId::of(this)
    }

    fn numeric_eq(&self, other: &HostObject) -> Option<bool> {
        let int_float = |i: BigInt, f: f64| {
            f.fract() == 0.0 && BigInt::from_f64(f).is_some_and(|as_int| as_int == i)
        };
        match (&self.value, &other.value) {
            (HostValue::Float(a), HostValue::Float(b)) => Some(a == b),
            (HostValue::Float(f), _) => other.as_integer().map(|i| int_float(i, *f)),
            (_, HostValue::Float(f)) => self.as_integer().map(|i| int_float(i, *f)),
            _ => match (self.as_integer(), other.as_integer()) {
                (Some(a), Some(b)) => Some(a == b),
                _ => None,
            },
        }
    }
}

impl PartialEq for HostObject {
    fn eq(&self, other: &Self) -> bool {
        self.eq_guarded(other, &mut Vec::new())
    }
}

impl HostObject {
    // `open` holds the container pairs currently being compared. Meeting a
    // pair again means no difference was found along that path, so two
    // distinct self-referencing structures compare without recursing forever.
    fn eq_guarded(&self, other: &HostObject, open: &mut Vec<(HostId, HostId)>) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if let Some(equal) = self.numeric_eq(other) {
            return equal;
        }
        let pair = (HostId::of(self), HostId::of(other));
        match (&self.value, &other.value) {
            (HostValue::None, HostValue::None) | (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Str(a), HostValue::Str(b)) => a == b,
            (HostValue::Date(a), HostValue::Date(b)) => a == b,
            (HostValue::List(a), HostValue::List(b)) => {
                if open.contains(&pair) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return false;
                }
                open.push(pair);
                let equal = a.iter().zip(b.iter()).all(|(x, y)| x.eq_guarded(y, open));
                open.pop();
                equal
            }
            (HostValue::Dict(a), HostValue::Dict(b)) => {
                if open.contains(&pair) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return false;
                }
                open.push(pair);
                let equal = a
                    .iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| x.eq_guarded(y, open)));
                open.pop();
                equal
            }
            (HostValue::Function(a), HostValue::Function(b)) => a.ptr_eq(b),
            (HostValue::Awaitable(a), HostValue::Awaitable(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_repr(f, &mut Vec::new())
    }
}

impl fmt::Display for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_repr(f, &mut Vec::new())
    }
}

impl HostObject {
    // `open` holds the containers currently being printed so that a list
    // containing itself prints as `[...]` instead of recursing.
    fn write_repr(&self, f: &mut fmt::Formatter<'_>, open: &mut Vec<HostId>) -> fmt::Result {
        match &self.value {
            HostValue::None => f.write_str("none"),
            HostValue::Null => f.write_str("null"),
            HostValue::Bool(b) => write!(f, "{b}"),
            HostValue::Int(i) => write!(f, "{i}"),
            HostValue::BigInt(b) => write!(f, "{b}n"),
            HostValue::Float(x) => write!(f, "{x:?}"),
            HostValue::Str(s) => write!(f, "{s:?}"),
            HostValue::Date(d) => write!(f, "{}", d.to_rfc3339()),
            HostValue::Function(func) => write!(f, "{func:?}"),
            HostValue::Awaitable(a) => write!(f, "{a:?}"),
            HostValue::List(items) => {
                let id = HostId::of(self);
                if open.contains(&id) {
                    return f.write_str("[...]");
                }
                open.push(id);
                f.write_str("[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.write_repr(f, open)?;
                }
                open.pop();
                f.write_str("]")
            }
            HostValue::Dict(entries) => {
                let id = HostId::of(self);
                if open.contains(&id) {
                    return f.write_str("{...}");
                }
                open.push(id);
                f.write_str("{")?;
                for (i, (key, item)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key:?}: ")?;
                    item.write_repr(f, open)?;
                }
                open.pop();
                f.write_str("}")
            }
        }
    }
}
