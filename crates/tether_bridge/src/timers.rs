//! Timer handle registry
//!
//! Guest code only ever sees a [`TimeoutId`]; the registry owns the
//! [`AsyncHandle`] behind it and the host event loop task that fires it.
//! Timeouts and intervals share one id pool. An interval keeps its id for
//! its whole life and is re-armed under it after every tick.

use crate::error::ScheduleError;
use crate::roots::RootId;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use tether_host::running;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tracing::debug;

/// Largest id handed out, so ids stay valid guest int32 values.
const MAX_ID: u32 = i32::MAX as u32;

/// Shortest interval period, so a zero-delay interval cannot starve the loop.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

type Tick = Rc<dyn Fn(TimeoutId)>;

/// Opaque timer id visible to guest code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeoutId(pub u32);

impl fmt::Display for TimeoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle lifecycle: `Scheduled -> Fired -> Released` or
/// `Scheduled -> Cancelled -> Released`. An interval goes
/// `Fired -> Scheduled` after each tick, and a handle cancelled while it is
/// firing goes `Fired -> Cancelled` and is released by its own task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Scheduled,
    Fired,
    Cancelled,
    Released,
}

/// One scheduled, cancellable unit of host work.
pub struct AsyncHandle {
    id: TimeoutId,
    state: HandleState,
    delay: Duration,
    abort: AbortHandle,
    roots: Vec<RootId>,
    tick: Option<Tick>,
}

impl AsyncHandle {
    pub fn id(&self) -> TimeoutId {
        self.id
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_interval(&self) -> bool {
        self.tick.is_some()
    }

    /// Guest values pinned for the lifetime of this handle.
    pub fn roots(&self) -> &[RootId] {
        &self.roots
    }
}

impl fmt::Debug for AsyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncHandle")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("delay", &self.delay)
            .field("interval", &self.is_interval())
            .finish()
    }
}

/// Non-finite and negative delays run as soon as possible.
pub fn clamp_delay(seconds: f64) -> Duration {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

pub struct HandleRegistry {
    last_id: u32,
    handles: HashMap<TimeoutId, AsyncHandle>,
    idle: Rc<Notify>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            last_id: 0,
            handles: HashMap::new(),
            idle: Rc::new(Notify::new()),
        }
    }

    /// Notified whenever the last handle is released.
    pub fn idle(&self) -> Rc<Notify> {
        Rc::clone(&self.idle)
    }

    /// Schedule `callable` on the running loop after `delay_seconds`.
    ///
    /// `callable` receives its own id when it fires. The handle stays
    /// registered, and its id reserved, until [`HandleRegistry::release`]
    /// or [`HandleRegistry::cancel`] removes it.
    pub fn schedule<F>(
        &mut self,
        delay_seconds: f64,
        roots: Vec<RootId>,
        callable: F,
    ) -> Result<TimeoutId, ScheduleError>
    where
        F: FnOnce(TimeoutId) + 'static,
    {
        let event_loop = running().ok_or(ScheduleError::NoRunningLoop)?;
        let id = self.allocate()?;
        let delay = clamp_delay(delay_seconds);
        let abort = event_loop.call_later(delay, move || callable(id));

        self.handles.insert(
            id,
            AsyncHandle {
                id,
                state: HandleState::Scheduled,
                delay,
                abort,
                roots,
                tick: None,
            },
        );
        debug!(%id, ?delay, "scheduled timer");
        Ok(id)
    }

    /// Schedule `callable` to run every `delay_seconds` until cancelled.
    ///
    /// After each tick the firing task calls [`HandleRegistry::rearm`],
    /// which schedules the next one under the same id.
    pub fn schedule_interval<F>(
        &mut self,
        delay_seconds: f64,
        roots: Vec<RootId>,
        callable: F,
    ) -> Result<TimeoutId, ScheduleError>
    where
        F: Fn(TimeoutId) + 'static,
    {
        let event_loop = running().ok_or(ScheduleError::NoRunningLoop)?;
        let id = self.allocate()?;
        let delay = clamp_delay(delay_seconds).max(MIN_INTERVAL);
        let tick: Tick = Rc::new(callable);
        let first = Rc::clone(&tick);
        let abort = event_loop.call_later(delay, move || first(id));

        self.handles.insert(
            id,
            AsyncHandle {
                id,
                state: HandleState::Scheduled,
                delay,
                abort,
                roots,
                tick: Some(tick),
            },
        );
        debug!(%id, ?delay, "scheduled interval");
        Ok(id)
    }

    /// Schedule the next tick of a fired interval. Returns false for
    /// timeouts and for intervals cancelled while they were firing; those
    /// are left for the caller to release.
    pub fn rearm(&mut self, id: TimeoutId) -> Result<bool, ScheduleError> {
        let Some(handle) = self.handles.get_mut(&id) else {
            return Ok(false);
        };
        if handle.state != HandleState::Fired {
            return Ok(false);
        }
        let Some(tick) = handle.tick.clone() else {
            return Ok(false);
        };
        let event_loop = running().ok_or(ScheduleError::NoRunningLoop)?;
        handle.abort = event_loop.call_later(handle.delay, move || tick(id));
        handle.state = HandleState::Scheduled;
        Ok(true)
    }

    fn allocate(&mut self) -> Result<TimeoutId, ScheduleError> {
        if self.handles.len() >= MAX_ID as usize {
            return Err(ScheduleError::IdsExhausted);
        }
        loop {
            self.last_id = if self.last_id >= MAX_ID {
                1
            } else {
                self.last_id + 1
            };
            let id = TimeoutId(self.last_id);
            if !self.handles.contains_key(&id) {
                return Ok(id);
            }
        }
    }

    /// Called by the firing task before it runs the callable. Returns false
    /// if the handle was cancelled or released in the meantime.
    pub fn mark_fired(&mut self, id: TimeoutId) -> bool {
        match self.handles.get_mut(&id) {
            Some(handle) if handle.state == HandleState::Scheduled => {
                handle.state = HandleState::Fired;
                true
            }
            _ => false,
        }
    }

    /// Cancel a scheduled handle and release it.
    ///
    /// Unknown and already released ids are a silent no-op. A handle that is
    /// firing right now finishes, is not re-armed, and is released by its
    /// own task.
    pub fn cancel(&mut self, id: TimeoutId) -> Option<AsyncHandle> {
        let handle = self.handles.get_mut(&id)?;
        match handle.state {
            HandleState::Scheduled => {
                handle.abort.abort();
                handle.state = HandleState::Cancelled;
                debug!(%id, "cancelled timer");
                self.release(id)
            }
            HandleState::Fired => {
                handle.state = HandleState::Cancelled;
                debug!(%id, "cancelled firing timer");
                None
            }
            HandleState::Cancelled | HandleState::Released => None,
        }
    }

    pub fn release(&mut self, id: TimeoutId) -> Option<AsyncHandle> {
        let mut handle = self.handles.remove(&id)?;
        handle.state = HandleState::Released;
        if self.handles.is_empty() {
            self.idle.notify_waiters();
        }
        Some(handle)
    }

    pub fn handle_from_id(&self, id: TimeoutId) -> Option<&AsyncHandle> {
        self.handles.get(&id)
    }

    pub fn cancel_all(&mut self) -> Vec<AsyncHandle> {
        let ids: Vec<TimeoutId> = self.handles.keys().copied().collect();
        ids.into_iter()
            .filter_map(|id| {
                let handle = self.handles.get(&id)?;
                handle.abort.abort();
                self.release(id)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
