use super::{kind_mismatch, refresh_item};
use crate::factory::Coercion;
use crate::roots::Snapshot;
use indexmap::IndexMap;
use rquickjs::{Exception, Object, Value};
use std::collections::HashSet;
use tether_host::{HostObject, HostRef};
use tracing::debug;

host_wrapper!(DictWrapper => Dict);

impl DictWrapper {
    /// Own enumerable string-keyed properties, in guest order. A guest object
    /// maps to one host dict for as long as the host holds it.
    pub fn from_guest<'js>(cx: &mut Coercion<'js>, object: Object<'js>) -> rquickjs::Result<Self> {
        let value = object.clone().into_value();
        if let Some(handle) = cx.linked(&value).filter(|handle| handle.as_dict().is_some()) {
            cx.remember_guest(&value, &handle);
            sync(cx, &handle, &object)?;
            return Ok(Self::from_host(handle));
        }

        let handle = HostObject::dict(Vec::<(String, HostRef)>::new());
        cx.remember_guest(&value, &handle);

        let mut entries = IndexMap::new();
        for key in object.keys::<String>() {
            let key = key?;
            let item: Value = object.get(key.as_str())?;
            let item = cx.property_to_host(&value, item)?;
            entries.insert(key, item);
        }
        if let Some(dict) = handle.as_dict() {
            *dict.borrow_mut() = entries.clone();
        }

        cx.link(&handle, &value, Snapshot::dict(&entries));
        Ok(Self::from_host(handle))
    }

    /// A guest error object as a plain `{name, message, stack}` dict. It is
    /// not linked: those properties are not enumerable on the error.
    pub fn from_error<'js>(cx: &mut Coercion<'js>, exception: Exception<'js>) -> rquickjs::Result<Self> {
        let handle = HostObject::dict(Vec::<(String, HostRef)>::new());
        let value = exception.clone().into_value();
        cx.remember_guest(&value, &handle);

        let object = exception.as_object();
        let mut entries = IndexMap::new();
        for key in ["name", "message", "stack"] {
            let item: Value = object.get(key)?;
            let item = cx.property_to_host(&value, item)?;
            entries.insert(key.to_string(), item);
        }
        if let Some(dict) = handle.as_dict() {
            *dict.borrow_mut() = entries;
        }
        Ok(Self::from_host(handle))
    }

    /// The linked guest object, synced first; a host-native dict gets a new
    /// object that stays linked to it from then on.
    pub fn to_guest<'js>(&self, cx: &mut Coercion<'js>) -> rquickjs::Result<Value<'js>> {
        let dict = self
            .handle
            .as_dict()
            .ok_or_else(|| kind_mismatch(&self.handle, "dict"))?;

        if let Some(object) = cx.origin(&self.handle)?.and_then(Value::into_object) {
            let value = object.clone().into_value();
            cx.remember_host(&self.handle, &value);
            sync(cx, &self.handle, &object)?;
            return Ok(value);
        }

        let entries = dict.borrow().clone();
        let object = Object::new(cx.ctx().clone())?;
        let value = object.clone().into_value();
        cx.remember_host(&self.handle, &value);
        for (key, item) in &entries {
            let item = cx.host_to_guest(item)?;
            object.set(key.as_str(), item)?;
        }
        cx.link(&self.handle, &value, Snapshot::dict(&entries));
        Ok(value)
    }
}

/// Keys the host set or removed since the last sync are written to the
/// guest object. Every other key is read back from it, so keys the guest
/// added or deleted show up on the host.
pub(crate) fn sync<'js>(
    cx: &mut Coercion<'js>,
    handle: &HostRef,
    object: &Object<'js>,
) -> rquickjs::Result<()> {
    if !cx.begin_sync(handle) {
        return Ok(());
    }
    let dict = handle
        .as_dict()
        .ok_or_else(|| kind_mismatch(handle, "dict"))?;
    let Ok(current) = dict.try_borrow().map(|entries| entries.clone()) else {
        debug!("dict is borrowed, sync skipped");
        return Ok(());
    };
    let seen = match cx.snapshot(handle) {
        Some(Snapshot::Dict(seen)) => seen,
        _ => IndexMap::new(),
    };

    let written: HashSet<&str> = current
        .iter()
        .filter(|(key, item)| {
            !seen
                .get(*key)
                .is_some_and(|seen| Snapshot::same(seen, item))
        })
        .map(|(key, _)| key.as_str())
        .collect();
    for key in seen.keys().filter(|key| !current.contains_key(*key)) {
        object.remove(key.as_str())?;
    }
    for key in &written {
        let item = cx.host_to_guest(&current[*key])?;
        object.set(*key, item)?;
    }

    let value = object.clone().into_value();
    let mut entries = IndexMap::with_capacity(current.len());
    for key in object.keys::<String>() {
        let key = key?;
        let item = match current.get(&key) {
            Some(item) if written.contains(key.as_str()) => item.clone(),
            existing => {
                let guest: Value = object.get(key.as_str())?;
                refresh_item(cx, &value, guest, existing)?
            }
        };
        entries.insert(key, item);
    }
    // Written keys the guest does not enumerate still belong to the host.
    for (key, item) in &current {
        if written.contains(key.as_str()) && !entries.contains_key(key) {
            entries.insert(key.clone(), item.clone());
        }
    }

    match dict.try_borrow_mut() {
        Ok(mut target) => *target = entries.clone(),
        Err(_) => {
            debug!("dict is borrowed, sync skipped");
            return Ok(());
        }
    }
    cx.set_snapshot(handle, Snapshot::dict(&entries));
    Ok(())
}
