use super::{kind_mismatch, BigIntWrapper};
use rquickjs::{Ctx, Value};
use tether_host::HostObject;

/// Largest integer a guest number holds exactly, 2^53 - 1.
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

host_wrapper!(IntWrapper => Int);

impl IntWrapper {
    pub fn from_guest(value: i32) -> Self {
        Self::from_host(HostObject::int(value.into()))
    }

    /// Small integers become guest numbers. Anything past the safe range
    /// becomes a guest bigint so no precision is lost.
    pub fn to_guest<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        let value = self
            .handle
            .as_int()
            .ok_or_else(|| kind_mismatch(&self.handle, "int"))?;
        if let Ok(small) = i32::try_from(value) {
            Ok(Value::new_int(ctx.clone(), small))
        } else if (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&value) {
            Ok(Value::new_float(ctx.clone(), value as f64))
        } else {
            BigIntWrapper::project(ctx, &value.into())
        }
    }
}
