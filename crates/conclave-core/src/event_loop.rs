//! Single-threaded cooperative task queue.
//!
//! The loop owns all mutable protocol state by convention: transport
//! callbacks and deferred round transitions are pushed here and every task
//! runs to completion before the next is dispatched, so handlers never
//! observe half-applied state and the exchange needs no locks. The type is
//! deliberately `!Send` (interior mutability via `RefCell`); state shared
//! with tasks lives in `Rc`s on the same thread.
//!
//! Immediate tasks run FIFO. Delayed tasks run once their timepoint has
//! passed, ordered by timepoint then insertion.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::time::Instant;

type Task = Box<dyn FnOnce()>;

struct TimedTask {
    at: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for TimedTask {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for TimedTask {}

impl PartialOrd for TimedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedTask {
    // Reversed so the max-heap pops the earliest timepoint first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Cooperative task queue driving the key exchanges of one process.
pub struct EventLoop {
    ready: RefCell<VecDeque<Task>>,
    timed: RefCell<BinaryHeap<TimedTask>>,
    timer_seq: Cell<u64>,
    finished: Cell<usize>,
}

impl EventLoop {
    /// Create an empty loop.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: RefCell::new(VecDeque::new()),
            timed: RefCell::new(BinaryHeap::new()),
            timer_seq: Cell::new(0),
            finished: Cell::new(0),
        }
    }

    /// Enqueue a task to run on the next [`Self::run_pending`] pass.
    pub fn push_task(&self, task: impl FnOnce() + 'static) {
        self.ready.borrow_mut().push_back(Box::new(task));
    }

    /// Enqueue a task to run once `at` has passed.
    pub fn add_task(&self, at: Instant, task: impl FnOnce() + 'static) {
        let seq = self.timer_seq.get();
        self.timer_seq.set(seq + 1);
        self.timed.borrow_mut().push(TimedTask { at, seq, task: Box::new(task) });
    }

    /// Run tasks until nothing is ready and no timer is due.
    ///
    /// Tasks may enqueue further tasks; those run in the same pass. Timers
    /// whose timepoint has not been reached stay queued.
    pub fn run_pending(&self) {
        loop {
            self.promote_due(Instant::now());
            let task = self.ready.borrow_mut().pop_front();
            match task {
                Some(task) => task(),
                None => break,
            }
        }
    }

    /// True if an immediate task is queued or a timer is already due.
    #[must_use]
    pub fn has_ready(&self) -> bool {
        if !self.ready.borrow().is_empty() {
            return true;
        }
        self.timed.borrow().peek().is_some_and(|t| t.at <= Instant::now())
    }

    /// Timepoint of the next queued timer, if any.
    #[must_use]
    pub fn next_timer(&self) -> Option<Instant> {
        self.timed.borrow().peek().map(|t| t.at)
    }

    /// Record that one secured channel has finished its key exchange.
    ///
    /// The process orchestration polls [`Self::finished_channels`] to know
    /// when every channel it secures holds a key.
    pub fn channel_finished(&self) {
        self.finished.set(self.finished.get() + 1);
    }

    /// Number of [`Self::channel_finished`] signals seen so far.
    #[must_use]
    pub fn finished_channels(&self) -> usize {
        self.finished.get()
    }

    fn promote_due(&self, now: Instant) {
        let mut timed = self.timed.borrow_mut();
        let mut ready = self.ready.borrow_mut();
        while timed.peek().is_some_and(|t| t.at <= now) {
            let timed_task = timed.pop().expect("invariant: peek just returned Some");
            ready.push_back(timed_task.task);
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn tasks_run_in_fifo_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let ev = EventLoop::new();
        for i in 0..4 {
            let log = Rc::clone(&log);
            ev.push_task(move || log.borrow_mut().push(i));
        }
        ev.run_pending();
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn tasks_may_enqueue_tasks() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let ev = Rc::new(EventLoop::new());
        {
            let log = Rc::clone(&log);
            let ev2 = Rc::clone(&ev);
            ev.push_task(move || {
                log.borrow_mut().push("outer");
                let log = Rc::clone(&log);
                ev2.push_task(move || log.borrow_mut().push("inner"));
            });
        }
        ev.run_pending();
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn due_timers_fire_in_timepoint_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let ev = EventLoop::new();
        let now = Instant::now();
        for (label, offset_ms) in [("late", 2u64), ("early", 1)] {
            let log = Rc::clone(&log);
            ev.add_task(now - Duration::from_millis(offset_ms), move || {
                log.borrow_mut().push(label);
            });
        }
        ev.run_pending();
        assert_eq!(*log.borrow(), vec!["early", "late"]);
    }

    #[test]
    fn future_timers_stay_queued() {
        let fired = Rc::new(Cell::new(false));
        let ev = EventLoop::new();
        let flag = Rc::clone(&fired);
        ev.add_task(Instant::now() + Duration::from_secs(3600), move || flag.set(true));
        ev.run_pending();
        assert!(!fired.get());
        assert!(ev.next_timer().is_some());
        assert!(!ev.has_ready());
    }

    #[test]
    fn finished_channels_counts_signals() {
        let ev = EventLoop::new();
        assert_eq!(ev.finished_channels(), 0);
        ev.channel_finished();
        ev.channel_finished();
        assert_eq!(ev.finished_channels(), 2);
    }
}
