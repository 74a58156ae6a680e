//! Cooperative single-threaded event loop
//!
//! Wraps a current-thread tokio runtime and a `LocalSet` so host tasks may
//! hold `Rc` state. While [`EventLoop::run_until`] is driving the loop,
//! [`running`] hands out a [`LoopHandle`] on that thread; outside of it there
//! is no running loop and scheduling is refused by callers.

use std::cell::Cell;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::task::{AbortHandle, JoinHandle, LocalSet};

thread_local! {
    static RUNNING: Cell<usize> = const { Cell::new(0) };
}

pub struct EventLoop {
    runtime: Runtime,
    local: LocalSet,
}

impl EventLoop {
    pub fn new() -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            runtime,
            local: LocalSet::new(),
        })
    }

    /// Drive the loop until `future` completes.
    ///
    /// Tasks spawned earlier keep their place in the `LocalSet` and resume
    /// on the next call.
    pub fn run_until<F: Future>(&self, future: F) -> F::Output {
        let _running = RunningGuard::enter();
        self.local.block_on(&self.runtime, future)
    }
}

struct RunningGuard;

impl RunningGuard {
    fn enter() -> Self {
        RUNNING.with(|depth| depth.set(depth.get() + 1));
        RunningGuard
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        RUNNING.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// The loop currently running on this thread, if any.
pub fn running() -> Option<LoopHandle> {
    if RUNNING.with(Cell::get) > 0 {
        Some(LoopHandle { _private: () })
    } else {
        None
    }
}

/// Proof that a loop is running; only obtainable through [`running`].
#[derive(Debug, Clone, Copy)]
pub struct LoopHandle {
    _private: (),
}

impl LoopHandle {
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        tokio::task::spawn_local(future)
    }

    /// Run `f` on a later loop turn.
    pub fn call_soon<F>(&self, f: F) -> AbortHandle
    where
        F: FnOnce() + 'static,
    {
        self.call_later(Duration::ZERO, f)
    }

    /// Run `f` once `delay` has elapsed. A zero delay skips the timer wheel
    /// so the callback fires on the next turn.
    pub fn call_later<F>(&self, delay: Duration, f: F) -> AbortHandle
    where
        F: FnOnce() + 'static,
    {
        let task = tokio::task::spawn_local(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            f();
        });
        task.abort_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn no_loop_outside_run_until() {
        assert!(running().is_none());
        let event_loop = EventLoop::new().unwrap();
        let seen = event_loop.run_until(async { running().is_some() });
        assert!(seen);
        assert!(running().is_none());
    }

    #[test]
    fn call_soon_fires_after_one_yield() {
        let event_loop = EventLoop::new().unwrap();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        event_loop.run_until(async move {
            let handle = running().unwrap();
            handle.call_soon(move || counter.set(counter.get() + 1));
            tokio::task::yield_now().await;
        });
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn aborted_callback_never_runs() {
        let event_loop = EventLoop::new().unwrap();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        event_loop.run_until(async move {
            let handle = running().unwrap();
            let abort = handle.call_later(Duration::from_millis(5), move || {
                counter.set(counter.get() + 1)
            });
            abort.abort();
            tokio::time::sleep(Duration::from_millis(20)).await;
        });
        assert_eq!(hits.get(), 0);
    }
}
