#![forbid(unsafe_code)]

//! Batching queue for invalidated watchers.
//!
//! [`queue_watcher`] collects watchers invalidated during a synchronous burst
//! and defers one flush to the next tick. The flush runs them in ascending
//! id order (creation order, so parents before children) and honors work
//! queued while it drains:
//!
//! ```text
//!   write ─► Dep::notify ─► Watcher::update ─► queue_watcher ─┐
//!                                                             │ first in pass
//!                                                             ▼
//!                                      next_tick(flush) ──► flush
//!                                                             │
//!            sorted pass: before() ► run() ► circular check ◄─┘
//!                                                             │
//!                                    reset ► post-flush hooks ┘
//! ```
//!
//! # Invariants
//!
//! 1. A watcher is queued at most once per pending pass (`has` set).
//! 2. Within one pass watchers run in ascending id order, including those
//!    inserted mid-pass at their sorted position after the cursor.
//! 3. A watcher that re-queues itself more than
//!    [`Config::max_update_count`](crate::config::Config) times in one pass
//!    is reported once and suppressed for the rest of the pass.
//! 4. Bookkeeping is reset after every pass, including failed ones.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Weak;

use ahash::{AHashMap, AHashSet};

use crate::config;
use crate::error::{ErrorContext, ReactiveError, handle_error};
use crate::next_tick;
use crate::watcher::{Watcher, WatcherInner};

type PostFlushHook = Box<dyn FnOnce()>;

#[derive(Default)]
struct SchedulerState {
    queue: Vec<(u64, Weak<WatcherInner>)>,
    has: AHashSet<u64>,
    circular: AHashMap<u64, usize>,
    suppressed: AHashSet<u64>,
    post_flush: VecDeque<PostFlushHook>,
    /// A flush is scheduled or running.
    waiting: bool,
    flushing: bool,
    /// Position of the next entry to run.
    index: usize,
}

impl SchedulerState {
    fn reset(&mut self) -> VecDeque<PostFlushHook> {
        self.queue.clear();
        self.has.clear();
        self.circular.clear();
        self.suppressed.clear();
        self.waiting = false;
        self.flushing = false;
        self.index = 0;
        std::mem::take(&mut self.post_flush)
    }
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

/// Queue `watcher` for the next flush.
///
/// Duplicate requests within one pending pass are ignored. While a flush is
/// running, the watcher is inserted after the cursor at its id position so
/// it still runs in this pass. With `async_mode` off the flush happens
/// before this call returns.
pub fn queue_watcher(watcher: &Watcher) {
    let id = watcher.id();
    let schedule = SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        if state.suppressed.contains(&id) || !state.has.insert(id) {
            return false;
        }
        let entry = (id, watcher.downgrade());
        if state.flushing {
            let mut at = state.queue.len();
            while at > state.index && state.queue[at - 1].0 > id {
                at -= 1;
            }
            state.queue.insert(at, entry);
        } else {
            state.queue.push(entry);
        }
        !std::mem::replace(&mut state.waiting, true)
    });
    if !schedule {
        return;
    }
    if config::config().async_mode {
        next_tick::defer(Box::new(flush));
    } else if let Err(err) = flush() {
        handle_error(&err, &ErrorContext::Scheduler);
    }
}

/// Register a hook to run after the next flush pass, in FIFO order.
///
/// Schedules a flush if none is pending so the hook always runs.
pub fn queue_post_flush(hook: impl FnOnce() + 'static) {
    let schedule = SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        state.post_flush.push_back(Box::new(hook));
        !std::mem::replace(&mut state.waiting, true)
    });
    if schedule {
        next_tick::defer(Box::new(flush));
    }
}

/// Number of watchers queued and not yet run.
#[must_use]
pub fn pending() -> usize {
    SCHEDULER.with(|state| state.borrow().has.len())
}

/// Whether a flush pass is currently draining.
#[must_use]
pub fn is_flushing() -> bool {
    SCHEDULER.with(|state| state.borrow().flushing)
}

/// Drain the queue: one sorted pass, then reset and run post-flush hooks.
///
/// A non-user watcher failure aborts the pass. Bookkeeping is reset and the
/// pass's post-flush hooks are discarded before the error is returned.
fn flush() -> Result<(), ReactiveError> {
    let _span = tracing::debug_span!("scheduler.flush").entered();
    let queue_len = SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        state.flushing = true;
        state.index = 0;
        state.queue.sort_by_key(|(id, _)| *id);
        state.queue.len()
    });
    let limit = config::config().max_update_count;
    let mut ran = 0usize;
    let mut suppressed = 0usize;

    let outcome = loop {
        let next = SCHEDULER.with(|state| {
            let mut state = state.borrow_mut();
            let entry = state.queue.get(state.index).cloned();
            state.index += 1;
            entry
        });
        let Some((id, weak)) = next else {
            break Ok(());
        };
        if SCHEDULER.with(|state| state.borrow().suppressed.contains(&id)) {
            continue;
        }
        let Some(inner) = weak.upgrade() else {
            SCHEDULER.with(|state| state.borrow_mut().has.remove(&id));
            continue;
        };
        let watcher = Watcher::from_inner(inner);
        watcher.call_before();
        // Writes from the before hook fold into this run.
        SCHEDULER.with(|state| state.borrow_mut().has.remove(&id));
        if let Err(err) = watcher.run() {
            break Err(err);
        }
        ran += 1;

        let overflowed = SCHEDULER.with(|state| {
            let mut state = state.borrow_mut();
            if !state.has.contains(&id) {
                return false;
            }
            let count = state.circular.entry(id).or_insert(0);
            *count += 1;
            if *count > limit {
                state.suppressed.insert(id);
                state.has.remove(&id);
                true
            } else {
                false
            }
        });
        if overflowed {
            suppressed += 1;
            let expression = if watcher.is_render() {
                String::from("render")
            } else {
                watcher.expression().to_owned()
            };
            handle_error(
                &ReactiveError::CircularUpdate {
                    id,
                    expression,
                    limit,
                },
                &ErrorContext::Scheduler,
            );
        }
    };

    let hooks = SCHEDULER.with(|state| state.borrow_mut().reset());
    tracing::debug!(queue_len, ran, suppressed, "flush pass complete");
    if let Err(err) = outcome {
        tracing::debug!(dropped_hooks = hooks.len(), "flush aborted");
        return Err(err);
    }
    for hook in hooks {
        hook();
    }
    Ok(())
}
