//! Single-assignment completion cells shared between host tasks.

use crate::event_loop;
use crate::{HostError, HostRef};
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

pub type Outcome = Result<HostRef, HostError>;

type DoneCallback = Box<dyn FnOnce(Outcome)>;

enum State {
    Pending {
        wakers: Vec<Waker>,
        callbacks: Vec<DoneCallback>,
    },
    Done(Outcome),
}

/// A host awaitable. Clones share the same completion; awaiting any clone
/// yields the outcome once it is set.
#[derive(Clone)]
pub struct Awaitable {
    state: Rc<RefCell<State>>,
}

impl Awaitable {
    pub fn pending() -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Pending {
                wakers: Vec::new(),
                callbacks: Vec::new(),
            })),
        }
    }

    pub fn resolved(value: HostRef) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Done(Ok(value)))),
        }
    }

    pub fn rejected(error: HostError) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Done(Err(error)))),
        }
    }

    /// Drive `future` on the running loop and complete with its output.
    pub fn from_future<F>(future: F) -> Result<Self, HostError>
    where
        F: Future<Output = Outcome> + 'static,
    {
        let handle = event_loop::running().ok_or(HostError::NoRunningLoop)?;
        let awaitable = Self::pending();
        let target = awaitable.clone();
        handle.spawn(async move {
            let outcome = future.await;
            target.complete(outcome);
        });
        Ok(awaitable)
    }

    pub fn resolve(&self, value: HostRef) -> bool {
        self.complete(Ok(value))
    }

    pub fn reject(&self, error: HostError) -> bool {
        self.complete(Err(error))
    }

    pub fn cancel(&self) -> bool {
        self.complete(Err(HostError::Cancelled))
    }

    /// Returns false if already complete; the first outcome wins.
    fn complete(&self, outcome: Outcome) -> bool {
        let (wakers, callbacks) = {
            let mut state = self.state.borrow_mut();
            let State::Pending { wakers, callbacks } = &mut *state else {
                return false;
            };
            let taken = (mem::take(wakers), mem::take(callbacks));
            *state = State::Done(outcome.clone());
            taken
        };
        for waker in wakers {
            waker.wake();
        }
        for callback in callbacks {
            dispatch(callback, outcome.clone());
        }
        true
    }

    pub fn is_done(&self) -> bool {
        matches!(*self.state.borrow(), State::Done(_))
    }

    pub fn result(&self) -> Option<Outcome> {
        match &*self.state.borrow() {
            State::Done(outcome) => Some(outcome.clone()),
            State::Pending { .. } => None,
        }
    }

    /// Run `f` with the outcome. Scheduled on the running loop when there is
    /// one, otherwise invoked inline.
    pub fn add_done_callback<F>(&self, f: F)
    where
        F: FnOnce(Outcome) + 'static,
    {
        let outcome = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Pending { callbacks, .. } => {
                    callbacks.push(Box::new(f));
                    return;
                }
                State::Done(outcome) => outcome.clone(),
            }
        };
        dispatch(Box::new(f), outcome);
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

fn dispatch(callback: DoneCallback, outcome: Outcome) {
    match event_loop::running() {
        Some(handle) => {
            handle.call_soon(move || callback(outcome));
        }
        None => callback(outcome),
    }
}

impl Future for Awaitable {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        let mut state = self.state.borrow_mut();
        match &mut *state {
            State::Done(outcome) => Poll::Ready(outcome.clone()),
            State::Pending { wakers, .. } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for Awaitable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state.borrow() {
            State::Pending { .. } => f.write_str("<awaitable pending>"),
            State::Done(Ok(value)) => write!(f, "<awaitable result={value}>"),
            State::Done(Err(error)) => write!(f, "<awaitable error={error}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventLoop, HostObject};
    use std::cell::Cell;

    #[test]
    fn first_completion_wins() {
        let awaitable = Awaitable::pending();
        assert!(awaitable.resolve(HostObject::int(1)));
        assert!(!awaitable.reject(HostError::raise("late")));
        assert_eq!(*awaitable.result().unwrap().unwrap(), *HostObject::int(1));
    }

    #[test]
    fn callbacks_run_inline_without_loop() {
        let awaitable = Awaitable::pending();
        let seen = Rc::new(Cell::new(false));
        let flag = seen.clone();
        awaitable.add_done_callback(move |outcome| flag.set(outcome.is_err()));
        awaitable.cancel();
        assert!(seen.get());
    }

    #[test]
    fn awaited_by_two_tasks() {
        let host_loop = EventLoop::new().unwrap();
        let total = host_loop.run_until(async {
            let awaitable = Awaitable::pending();
            let handle = event_loop::running().unwrap();
            let first = handle.spawn(awaitable.clone());
            let second = handle.spawn(awaitable.clone());
            awaitable.resolve(HostObject::int(21));
            let a = first.await.unwrap().unwrap().as_int().unwrap();
            let b = second.await.unwrap().unwrap().as_int().unwrap();
            a + b
        });
        assert_eq!(total, 42);
    }

    #[test]
    fn from_future_requires_loop() {
        let err = Awaitable::from_future(async { Ok(HostObject::none()) }).unwrap_err();
        assert_eq!(err, HostError::NoRunningLoop);
    }
}
