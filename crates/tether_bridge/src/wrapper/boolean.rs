use super::kind_mismatch;
use rquickjs::{Ctx, Value};
use tether_host::HostObject;

host_wrapper!(BoolWrapper => Bool);

impl BoolWrapper {
    pub fn from_guest(value: bool) -> Self {
        Self::from_host(HostObject::bool(value))
    }

    pub fn to_guest<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        let value = self
            .handle
            .as_bool()
            .ok_or_else(|| kind_mismatch(&self.handle, "bool"))?;
        Ok(Value::new_bool(ctx.clone(), value))
    }
}
