use super::kind_mismatch;
use chrono::{DateTime, Utc};
use rquickjs::{Ctx, FromJs, IntoJs, Value};
use tether_host::HostObject;

host_wrapper! {
    /// Millisecond precision, UTC.
    DateWrapper => Date
}

impl DateWrapper {
    pub fn from_guest<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<Self> {
        let date = DateTime::<Utc>::from_js(ctx, value)?;
        Ok(Self::from_host(HostObject::date(date)))
    }

    pub fn to_guest<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        self.handle
            .as_date()
            .ok_or_else(|| kind_mismatch(&self.handle, "date"))?
            .into_js(ctx)
    }
}
