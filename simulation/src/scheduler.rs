//! Deterministic discrete-event scheduler
//!
//! Events fire in simulated-time order. Events due at the same instant are
//! ordered by lane, then by the order they were scheduled in: network-wide
//! events (lane `None`) first, then per-node events by ascending node id.
//! Every scheduled event gets a [`TimerId`] that can be cancelled before
//! it fires.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use satnet_core::{NodeId, SimTime};

/// Handle to a scheduled event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

struct Entry<E> {
    at: SimTime,
    lane: Option<NodeId>,
    seq: u64,
    event: E,
}

impl<E> Entry<E> {
    fn key(&self) -> (SimTime, Option<NodeId>, u64) {
        (self.at, self.lane, self.seq)
    }
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    // reversed: BinaryHeap is a max-heap
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

/// A fired event together with when and where it fires
#[derive(Debug, Clone, PartialEq)]
pub struct Fired<E> {
    pub at: SimTime,
    pub lane: Option<NodeId>,
    pub timer: TimerId,
    pub event: E,
}

/// Single-threaded event queue over simulated time
pub struct Scheduler<E> {
    queue: BinaryHeap<Entry<E>>,
    /// Sequence numbers still due to fire
    live: BTreeSet<u64>,
    /// Cancelled entries not yet popped off the heap
    cancelled: BTreeSet<u64>,
    now: SimTime,
    next_seq: u64,
    fired: u64,
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            live: BTreeSet::new(),
            cancelled: BTreeSet::new(),
            now: SimTime::ZERO,
            next_seq: 0,
            fired: 0,
        }
    }

    /// Time of the event fired last
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Number of events fired so far
    pub fn fired(&self) -> u64 {
        self.fired
    }

    /// Schedule `event` at `at`. Times in the past are clamped to now.
    pub fn schedule_at(&mut self, at: SimTime, lane: Option<NodeId>, event: E) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert(seq);
        self.queue.push(Entry {
            at: at.max(self.now),
            lane,
            seq,
            event,
        });
        TimerId(seq)
    }

    /// Schedule `event` `delay_ns` after now
    pub fn schedule_after(&mut self, delay_ns: u64, lane: Option<NodeId>, event: E) -> TimerId {
        self.schedule_at(self.now.after(delay_ns), lane, event)
    }

    /// Cancel a pending event. Returns false if it already fired or was
    /// never scheduled.
    pub fn cancel(&mut self, timer: TimerId) -> bool {
        if !self.live.remove(&timer.0) {
            return false;
        }
        self.cancelled.insert(timer.0);
        true
    }

    /// Pop the next live event and advance the clock to it
    pub fn pop(&mut self) -> Option<Fired<E>> {
        while let Some(entry) = self.queue.pop() {
            if self.cancelled.remove(&entry.seq) {
                continue;
            }
            self.live.remove(&entry.seq);
            self.now = entry.at;
            self.fired += 1;
            return Some(Fired {
                at: entry.at,
                lane: entry.lane,
                timer: TimerId(entry.seq),
                event: entry.event,
            });
        }
        None
    }

    /// Time of the next live event. Cancelled entries on top of the queue
    /// are discarded on the way.
    pub fn peek_time(&mut self) -> Option<SimTime> {
        while let Some(top) = self.queue.peek() {
            if !self.cancelled.contains(&top.seq) {
                return Some(top.at);
            }
            let seq = top.seq;
            self.queue.pop();
            self.cancelled.remove(&seq);
        }
        None
    }

    /// Pending events, cancelled ones excluded
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(scheduler: &mut Scheduler<&'static str>) -> Vec<&'static str> {
        std::iter::from_fn(|| scheduler.pop().map(|fired| fired.event)).collect()
    }

    #[test]
    fn test_time_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_at(SimTime::from_millis(30), None, "c");
        scheduler.schedule_at(SimTime::from_millis(10), None, "a");
        scheduler.schedule_at(SimTime::from_millis(20), None, "b");
        assert_eq!(drain(&mut scheduler), vec!["a", "b", "c"]);
        assert_eq!(scheduler.now(), SimTime::from_millis(30));
        assert_eq!(scheduler.fired(), 3);
    }

    #[test]
    fn test_same_instant_tie_break() {
        let mut scheduler = Scheduler::new();
        let t = SimTime::from_millis(5);
        scheduler.schedule_at(t, Some(NodeId(2)), "node2-first");
        scheduler.schedule_at(t, Some(NodeId(1)), "node1");
        scheduler.schedule_at(t, Some(NodeId(2)), "node2-second");
        scheduler.schedule_at(t, None, "global");
        assert_eq!(
            drain(&mut scheduler),
            vec!["global", "node1", "node2-first", "node2-second"]
        );
    }

    #[test]
    fn test_cancel() {
        let mut scheduler = Scheduler::new();
        let keep = scheduler.schedule_after(10, None, "keep");
        let drop = scheduler.schedule_after(5, None, "drop");
        assert!(scheduler.cancel(drop));
        assert!(!scheduler.cancel(drop));
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.peek_time(), Some(SimTime::from_nanos(10)));

        let fired = scheduler.pop().unwrap();
        assert_eq!(fired.timer, keep);
        assert!(!scheduler.cancel(keep));
        assert!(scheduler.pop().is_none());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_cancelled_head_is_skipped_by_peek() {
        let mut scheduler = Scheduler::new();
        let timers: Vec<_> = (1..=1000)
            .map(|i| scheduler.schedule_at(SimTime::from_nanos(i), Some(NodeId(1)), "tick"))
            .collect();
        scheduler.schedule_at(SimTime::from_nanos(5000), None, "last");
        for timer in &timers {
            assert!(scheduler.cancel(*timer));
        }
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.peek_time(), Some(SimTime::from_nanos(5000)));
        assert!(!scheduler.cancel(timers[0]));
        assert_eq!(scheduler.pop().map(|fired| fired.event), Some("last"));
        assert_eq!(scheduler.peek_time(), None);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_past_times_are_clamped() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_at(SimTime::from_millis(10), None, "later");
        scheduler.pop();
        scheduler.schedule_at(SimTime::from_millis(1), None, "late");
        let fired = scheduler.pop().unwrap();
        assert_eq!(fired.at, SimTime::from_millis(10));
    }
}
