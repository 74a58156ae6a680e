use super::kind_mismatch;
use rquickjs::{Ctx, Value};
use tether_host::HostObject;

host_wrapper! {
    /// `undefined` maps to the host "no value" singleton, `null` to the
    /// null sentinel, so the two survive a round trip.
    NullWrapper => Null
}

impl NullWrapper {
    pub fn undefined() -> Self {
        Self::from_host(HostObject::none())
    }

    pub fn null() -> Self {
        Self::from_host(HostObject::null())
    }

    pub fn to_guest<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        if self.handle.is_null() {
            Ok(Value::new_null(ctx.clone()))
        } else if self.handle.is_none() {
            Ok(Value::new_undefined(ctx.clone()))
        } else {
            Err(kind_mismatch(&self.handle, "null"))
        }
    }
}
