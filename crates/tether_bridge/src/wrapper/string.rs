use super::kind_mismatch;
use crate::factory::Coercion;
use rquickjs::{Ctx, Error, Value};
use tether_host::text::decode_utf16_lossy;
use tether_host::HostObject;

host_wrapper! {
    /// Guest strings are UTF-16. Well-formed ones convert directly; strings
    /// holding lone surrogates are read unit by unit and decoded lossily.
    StrWrapper => Str
}

impl StrWrapper {
    pub fn from_guest<'js>(
        cx: &mut Coercion<'js>,
        string: rquickjs::String<'js>,
    ) -> rquickjs::Result<Self> {
        let text = match string.to_string() {
            Ok(text) => text,
            Err(Error::Utf8(_)) => {
                let units = code_units(cx.ctx(), &string)?;
                decode_utf16_lossy(&units)
            }
            Err(err) => return Err(err),
        };
        Ok(Self::from_host(HostObject::string(text)))
    }

    pub fn to_guest<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        let text = self
            .handle
            .as_str()
            .ok_or_else(|| kind_mismatch(&self.handle, "str"))?;
        Ok(rquickjs::String::from_str(ctx.clone(), text)?.into_value())
    }
}

fn code_units<'js>(ctx: &Ctx<'js>, string: &rquickjs::String<'js>) -> rquickjs::Result<Vec<u16>> {
    let split: rquickjs::Function = ctx.eval(
        "(s) => { const out = new Array(s.length); for (let i = 0; i < s.length; i++) out[i] = s.charCodeAt(i); return out; }",
    )?;
    let units: Vec<u16> = split.call((string.clone(),))?;
    Ok(units)
}
