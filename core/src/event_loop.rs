//! Single-threaded cooperative scheduler.
//!
//! Two queues: a FIFO microtask queue for promise continuations and a
//! deadline-ordered timer queue for delays. Jobs enqueued while the loop
//! runs are picked up in the same drive; continuations attached to one
//! promise therefore run first-attached-first-run, strictly after the
//! promise settles.
//!
//! The loop also owns the host's unhandled-rejection channel: a rejected
//! promise whose rejection was never observed by any reaction is reported
//! once at drain time through `tracing::warn!`. Exceptions that the bridge
//! contains never reach this channel; they go to the bridge's injected
//! reporter instead.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::mem;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::LoopError;

type Job = Box<dyn FnOnce()>;

/// A probe asking "is this rejection still unobserved?"; answers the
/// rendered rejection reason if so.
pub(crate) type RejectionProbe = Box<dyn Fn() -> Option<String>>;

struct TimerEntry {
    due: Instant,
    seq: u64,
    job: Job,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the nearest deadline wins,
        // with insertion order as the tiebreak.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct LoopState {
    microtasks: VecDeque<Job>,
    timers: BinaryHeap<TimerEntry>,
    timer_seq: u64,
    running: bool,
    rejection_probes: Vec<RejectionProbe>,
    reported_rejections: Vec<String>,
}

/// Handle to the scheduler. Clones alias one loop.
#[derive(Clone)]
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
}

impl EventLoop {
    /// Create an idle loop.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(LoopState {
                microtasks: VecDeque::new(),
                timers: BinaryHeap::new(),
                timer_seq: 0,
                running: false,
                rejection_probes: Vec::new(),
                reported_rejections: Vec::new(),
            })),
        }
    }

    /// Enqueue a job on the microtask queue.
    pub fn enqueue(&self, job: impl FnOnce() + 'static) {
        let mut state = self.state.borrow_mut();
        state.microtasks.push_back(Box::new(job));
        tracing::trace!(queued = state.microtasks.len(), "microtask enqueued");
    }

    /// Schedule a job to run once `delay` has elapsed. A zero delay fires
    /// on the next scheduling opportunity, after already-queued microtasks.
    pub(crate) fn schedule_timer(&self, delay: Duration, job: impl FnOnce() + 'static) {
        let mut state = self.state.borrow_mut();
        let seq = state.timer_seq;
        state.timer_seq += 1;
        state.timers.push(TimerEntry {
            due: Instant::now() + delay,
            seq,
            job: Box::new(job),
        });
        tracing::trace!(delay_ms = delay.as_millis() as u64, seq, "timer scheduled");
    }

    pub(crate) fn track_rejection(&self, probe: RejectionProbe) {
        self.state.borrow_mut().rejection_probes.push(probe);
    }

    /// Drive the loop until both queues are empty, sleeping until the
    /// nearest deadline when only timers remain. Flushes the
    /// unhandled-rejection channel before returning.
    pub fn run_until_idle(&self) -> Result<(), LoopError> {
        self.drive(true)
    }

    /// Drain queued microtasks and already-due timers without blocking.
    pub fn tick(&self) -> Result<(), LoopError> {
        self.drive(false)
    }

    fn drive(&self, block_on_timers: bool) -> Result<(), LoopError> {
        {
            let mut state = self.state.borrow_mut();
            if state.running {
                return Err(LoopError::ReentrantRun);
            }
            state.running = true;
        }

        loop {
            loop {
                // Pop in its own statement so no borrow is held while the
                // job runs; jobs routinely enqueue more jobs.
                let job = self.state.borrow_mut().microtasks.pop_front();
                let Some(job) = job else { break };
                job();
            }

            let next_due = self.state.borrow().timers.peek().map(|entry| entry.due);
            let Some(due) = next_due else { break };
            let now = Instant::now();
            if due > now {
                if !block_on_timers {
                    break;
                }
                thread::sleep(due - now);
            }
            let entry = self.state.borrow_mut().timers.pop();
            if let Some(entry) = entry {
                tracing::trace!(seq = entry.seq, "timer fired");
                (entry.job)();
            }
        }

        self.state.borrow_mut().running = false;
        self.flush_rejections();
        Ok(())
    }

    fn flush_rejections(&self) {
        let probes = mem::take(&mut self.state.borrow_mut().rejection_probes);
        for probe in probes {
            if let Some(reason) = probe() {
                tracing::warn!(%reason, "unhandled promise rejection");
                self.state.borrow_mut().reported_rejections.push(reason);
            }
        }
    }

    /// Drain the reasons the unhandled-rejection channel has reported
    /// since the last drain. Each rejection event yields at most one
    /// entry, for the terminal promise of its chain.
    #[must_use]
    pub fn take_reported_rejections(&self) -> Vec<String> {
        mem::take(&mut self.state.borrow_mut().reported_rejections)
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn marker(log: &Rc<RefCell<Vec<u32>>>, n: u32) -> impl FnOnce() + 'static {
        let log = Rc::clone(log);
        move || log.borrow_mut().push(n)
    }

    #[test]
    fn microtasks_run_in_fifo_order() {
        let driver = EventLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        driver.enqueue(marker(&log, 1));
        driver.enqueue(marker(&log, 2));
        driver.enqueue(marker(&log, 3));
        driver.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn jobs_enqueued_while_running_are_picked_up() {
        let driver = EventLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner = marker(&log, 2);
        let chained = {
            let driver = driver.clone();
            let log = Rc::clone(&log);
            move || {
                log.borrow_mut().push(1);
                driver.enqueue(inner);
            }
        };
        driver.enqueue(chained);
        driver.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn equal_deadline_timers_fire_in_schedule_order() {
        let driver = EventLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        driver.schedule_timer(Duration::ZERO, marker(&log, 1));
        driver.schedule_timer(Duration::ZERO, marker(&log, 2));
        driver.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn timers_run_after_queued_microtasks() {
        let driver = EventLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        driver.schedule_timer(Duration::ZERO, marker(&log, 2));
        driver.enqueue(marker(&log, 1));
        driver.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn tick_does_not_block_on_future_timers() {
        let driver = EventLoop::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        driver.schedule_timer(Duration::from_secs(3600), marker(&log, 9));
        driver.enqueue(marker(&log, 1));
        driver.tick().unwrap();
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn reentrant_drive_is_rejected() {
        let driver = EventLoop::new();
        let observed = Rc::new(RefCell::new(None));
        {
            let driver = driver.clone();
            let observed = Rc::clone(&observed);
            driver.clone().enqueue(move || {
                *observed.borrow_mut() = Some(driver.run_until_idle());
            });
        }
        driver.run_until_idle().unwrap();
        assert_eq!(*observed.borrow(), Some(Err(LoopError::ReentrantRun)));
    }
}
