use super::kind_mismatch;
use rquickjs::{Ctx, Value};
use tether_host::HostObject;

host_wrapper!(FloatWrapper => Float);

impl FloatWrapper {
    pub fn from_guest(value: f64) -> Self {
        Self::from_host(HostObject::float(value))
    }

    /// Always a guest float, even for integral values.
    pub fn to_guest<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        let value = self
            .handle
            .as_float()
            .ok_or_else(|| kind_mismatch(&self.handle, "float"))?;
        Ok(Value::new_float(ctx.clone(), value))
    }
}
