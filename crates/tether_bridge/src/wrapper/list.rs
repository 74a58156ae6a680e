use super::{kind_mismatch, refresh_item};
use crate::factory::Coercion;
use crate::roots::Snapshot;
use rquickjs::{Array, Value};
use tether_host::{HostObject, HostRef};
use tracing::debug;

host_wrapper!(ListWrapper => List);

impl ListWrapper {
    /// A guest array maps to one host list for as long as the host holds it.
    pub fn from_guest<'js>(cx: &mut Coercion<'js>, array: Array<'js>) -> rquickjs::Result<Self> {
        let value = array.clone().into_value();
        if let Some(handle) = cx.linked(&value).filter(|handle| handle.as_list().is_some()) {
            cx.remember_guest(&value, &handle);
            sync(cx, &handle, &array)?;
            return Ok(Self::from_host(handle));
        }

        let handle = HostObject::list([]);
        cx.remember_guest(&value, &handle);

        let mut items = Vec::with_capacity(array.len());
        for index in 0..array.len() {
            let item: Value = array.get(index)?;
            items.push(cx.property_to_host(&value, item)?);
        }
        if let Some(list) = handle.as_list() {
            *list.borrow_mut() = items.clone();
        }

        cx.link(&handle, &value, Snapshot::list(&items));
        Ok(Self::from_host(handle))
    }

    /// The linked guest array, synced first; a host-native list gets a new
    /// array that stays linked to it from then on.
    pub fn to_guest<'js>(&self, cx: &mut Coercion<'js>) -> rquickjs::Result<Value<'js>> {
        let list = self
            .handle
            .as_list()
            .ok_or_else(|| kind_mismatch(&self.handle, "list"))?;

        if let Some(array) = cx.origin(&self.handle)?.and_then(Value::into_array) {
            let value = array.clone().into_value();
            cx.remember_host(&self.handle, &value);
            sync(cx, &self.handle, &array)?;
            return Ok(value);
        }

        let items = list.borrow().clone();
        let array = Array::new(cx.ctx().clone())?;
        let value = array.clone().into_value();
        cx.remember_host(&self.handle, &value);
        write_items(cx, &array, &items)?;
        cx.link(&self.handle, &value, Snapshot::list(&items));
        Ok(value)
    }
}

/// Host writes since the last sync replace the guest array wholesale;
/// otherwise the host list is refreshed from the array.
pub(crate) fn sync<'js>(
    cx: &mut Coercion<'js>,
    handle: &HostRef,
    array: &Array<'js>,
) -> rquickjs::Result<()> {
    if !cx.begin_sync(handle) {
        return Ok(());
    }
    let list = handle
        .as_list()
        .ok_or_else(|| kind_mismatch(handle, "list"))?;
    let Ok(current) = list.try_borrow().map(|items| items.clone()) else {
        debug!("list is borrowed, sync skipped");
        return Ok(());
    };

    let host_wrote = match cx.snapshot(handle) {
        Some(Snapshot::List(seen)) => {
            seen.len() != current.len()
                || seen
                    .iter()
                    .zip(&current)
                    .any(|(seen, item)| !Snapshot::same(seen, item))
        }
        _ => true,
    };

    let items = if host_wrote {
        write_items(cx, array, &current)?;
        current
    } else {
        let value = array.clone().into_value();
        let mut items = Vec::with_capacity(array.len());
        for index in 0..array.len() {
            let item: Value = array.get(index)?;
            items.push(refresh_item(cx, &value, item, current.get(index))?);
        }
        match list.try_borrow_mut() {
            Ok(mut target) => *target = items.clone(),
            Err(_) => {
                debug!("list is borrowed, sync skipped");
                return Ok(());
            }
        }
        items
    };
    cx.set_snapshot(handle, Snapshot::list(&items));
    Ok(())
}

fn write_items<'js>(
    cx: &mut Coercion<'js>,
    array: &Array<'js>,
    items: &[HostRef],
) -> rquickjs::Result<()> {
    for (index, item) in items.iter().enumerate() {
        let item = cx.host_to_guest(item)?;
        array.set(index, item)?;
    }
    if array.len() != items.len() {
        array.as_object().set("length", items.len())?;
    }
    Ok(())
}
