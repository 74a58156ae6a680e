use super::kind_mismatch;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use rquickjs::{Coerced, Ctx, Error, Function, Value};
use tether_host::HostObject;

host_wrapper!(BigIntWrapper => BigInt);

impl BigIntWrapper {
    pub fn from_guest(value: &Value<'_>) -> rquickjs::Result<Self> {
        let digits = value.get::<Coerced<String>>()?.0;
        let parsed: BigInt = digits
            .parse()
            .map_err(|_| Error::new_from_js_message("bigint", "int", digits.clone()))?;
        Ok(Self::from_host(HostObject::bigint(parsed)))
    }

    pub fn to_guest<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        let value = self
            .handle
            .as_integer()
            .ok_or_else(|| kind_mismatch(&self.handle, "bigint"))?;
        Self::project(ctx, &value)
    }

    /// Build a guest bigint of any magnitude.
    pub(crate) fn project<'js>(ctx: &Ctx<'js>, value: &BigInt) -> rquickjs::Result<Value<'js>> {
        if let Some(small) = value.to_i64() {
            return Ok(rquickjs::BigInt::from_i64(ctx.clone(), small)?.into_value());
        }
        let constructor: Function = ctx.globals().get("BigInt")?;
        constructor.call((value.to_string(),))
    }
}
