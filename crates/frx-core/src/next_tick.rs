#![forbid(unsafe_code)]

//! Deferred callbacks: "run after the current synchronous batch".
//!
//! Callbacks registered with [`next_tick`] are collected in FIFO order and
//! drained together by one task handed to the active [`TickDriver`]. Each
//! drain runs a snapshot: callbacks registered while draining wait for the
//! next drain. The scheduler's flush goes through the same queue, so a
//! callback registered after a write observes the flushed state.
//!
//! The default driver is a thread-local microtask queue. Hosts without
//! their own event loop call [`run_microtasks`] at their checkpoint (end of
//! an event handler, end of a frame); hosts with one install a driver via
//! [`set_tick_driver`].

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::{ErrorContext, ReactiveError, handle_error};

/// A unit of work handed to a [`TickDriver`].
pub type Task = Box<dyn FnOnce()>;

pub(crate) type TickCallback = Box<dyn FnOnce() -> Result<(), ReactiveError>>;

/// The host's "after the current synchronous batch" boundary.
pub trait TickDriver {
    /// Run `task` once the current synchronous work completes.
    fn schedule(&self, task: Task);
}

/// Built-in driver backed by the thread-local microtask queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct MicrotaskDriver;

impl TickDriver for MicrotaskDriver {
    fn schedule(&self, task: Task) {
        MICROTASKS.with(|queue| queue.borrow_mut().push_back(task));
    }
}

thread_local! {
    static CALLBACKS: RefCell<Vec<TickCallback>> = const { RefCell::new(Vec::new()) };
    static PENDING: Cell<bool> = const { Cell::new(false) };
    static DRIVER: RefCell<Option<Rc<dyn TickDriver>>> = const { RefCell::new(None) };
    static MICROTASKS: RefCell<VecDeque<Task>> = const { RefCell::new(VecDeque::new()) };
}

/// Install the driver used for subsequent drains on this thread.
pub fn set_tick_driver(driver: impl TickDriver + 'static) {
    DRIVER.with(|slot| *slot.borrow_mut() = Some(Rc::new(driver)));
}

/// Restore the built-in [`MicrotaskDriver`].
pub fn reset_tick_driver() {
    DRIVER.with(|slot| slot.borrow_mut().take());
}

fn schedule_task(task: Task) {
    match DRIVER.with(|slot| slot.borrow().clone()) {
        Some(driver) => driver.schedule(task),
        None => MicrotaskDriver.schedule(task),
    }
}

/// Run queued microtasks until none remain, including ones queued while
/// running. Returns the number of tasks run.
pub fn run_microtasks() -> usize {
    let mut ran = 0;
    while let Some(task) = MICROTASKS.with(|queue| queue.borrow_mut().pop_front()) {
        task();
        ran += 1;
    }
    ran
}

/// Whether microtasks are waiting for [`run_microtasks`].
#[must_use]
pub fn has_pending_microtasks() -> bool {
    MICROTASKS.with(|queue| !queue.borrow().is_empty())
}

/// Run `callback` after the current synchronous batch.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    defer(Box::new(move || {
        callback();
        Ok(())
    }));
}

pub(crate) fn defer(callback: TickCallback) {
    CALLBACKS.with(|callbacks| callbacks.borrow_mut().push(callback));
    if !PENDING.with(|pending| pending.replace(true)) {
        schedule_task(Box::new(flush_callbacks));
    }
}

fn flush_callbacks() {
    PENDING.with(|pending| pending.set(false));
    let copies = CALLBACKS.with(|callbacks| std::mem::take(&mut *callbacks.borrow_mut()));
    for callback in copies {
        if let Err(err) = callback() {
            handle_error(&err, &ErrorContext::NextTick);
        }
    }
}

#[derive(Default)]
struct TickState {
    done: bool,
    waker: Option<Waker>,
}

/// Future returned by [`next_tick_future`].
#[must_use = "futures do nothing unless polled"]
pub struct NextTick {
    state: Rc<RefCell<TickState>>,
}

impl Future for NextTick {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.state.borrow_mut();
        if state.done {
            Poll::Ready(())
        } else {
            state.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

impl std::fmt::Debug for NextTick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextTick")
            .field("done", &self.state.borrow().done)
            .finish()
    }
}

/// A future that resolves once the current batch has drained.
pub fn next_tick_future() -> NextTick {
    let state = Rc::new(RefCell::new(TickState::default()));
    let shared = Rc::clone(&state);
    next_tick(move || {
        let waker = {
            let mut state = shared.borrow_mut();
            state.done = true;
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    });
    NextTick { state }
}
