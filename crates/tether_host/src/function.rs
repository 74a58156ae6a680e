//! Host callables

use crate::{HostError, HostRef};
use std::fmt;
use std::rc::Rc;

type Callable = dyn Fn(&[HostRef]) -> Result<HostRef, HostError>;

/// A named host function. Cloning shares the underlying closure.
#[derive(Clone)]
pub struct HostFunction {
    name: Rc<str>,
    call: Rc<Callable>,
}

impl HostFunction {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&[HostRef]) -> Result<HostRef, HostError> + 'static,
    {
        Self {
            name: Rc::from(name),
            call: Rc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[HostRef]) -> Result<HostRef, HostError> {
        (self.call)(args)
    }

    /// True when both handles share one closure.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.call, &other.call)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name)
    }
}
