// SPDX-License-Identifier: MPL-2.0

//! Scheduler and thread core (§4.1).

pub mod queue;
pub mod scheduler;
pub mod thread;

pub use queue::WaitQueue;
pub use scheduler::SCHEDULER;
pub use thread::{Thread, ThreadId, ThreadState};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc as StdArc;
    use std::time::Duration;

    fn settle() {
        std::thread::sleep(Duration::from_millis(20));
    }

    #[test]
    fn make_runnable_runs_to_completion() {
        let _g = crate::test_support::serialize();
        let ran = StdArc::new(AtomicI32::new(0));
        let ran2 = ran.clone();
        let t = SCHEDULER.spawn(move || {
            ran2.store(1, Ordering::SeqCst);
        });
        SCHEDULER.make_runnable(&t);
        settle();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(t.state(), ThreadState::Exited);
    }

    #[test]
    fn yield_reschedules_two_threads() {
        let _g = crate::test_support::serialize();
        let order = StdArc::new(SpinOrder::default());
        let o1 = order.clone();
        let o2 = order.clone();
        let t1 = SCHEDULER.spawn(move || {
            o1.record(1);
            SCHEDULER.yield_now();
            o1.record(3);
        });
        let t2 = SCHEDULER.spawn(move || {
            o2.record(2);
            SCHEDULER.yield_now();
            o2.record(4);
        });
        SCHEDULER.make_runnable(&t1);
        SCHEDULER.make_runnable(&t2);
        settle();
        let seq = order.snapshot();
        assert_eq!(seq, vec![1, 2, 3, 4]);
    }

    #[test]
    fn cancellable_sleep_is_interrupted() {
        let _g = crate::test_support::serialize();
        let q = StdArc::new(WaitQueue::new());
        let q2 = q.clone();
        let result = StdArc::new(std::sync::Mutex::new(None));
        let result2 = result.clone();
        let t = SCHEDULER.spawn(move || {
            let r = SCHEDULER.cancellable_sleep_on(&q2);
            *result2.lock().unwrap() = Some(r.map_err(|e| e.errno()));
        });
        SCHEDULER.make_runnable(&t);
        settle();
        assert!(q.len() == 1, "thread should be parked on the wait queue");
        SCHEDULER.cancel(&t);
        settle();
        assert!(q.is_empty());
        let got = result.lock().unwrap().take().unwrap();
        assert_eq!(got, Err(Errno::EINTR));
    }

    #[test]
    fn broadcast_wakes_all_sleepers() {
        let _g = crate::test_support::serialize();
        let q = StdArc::new(WaitQueue::new());
        let woken = StdArc::new(AtomicI32::new(0));
        let mut threads = Vec::new();
        for _ in 0..3 {
            let q2 = q.clone();
            let woken2 = woken.clone();
            let t = SCHEDULER.spawn(move || {
                SCHEDULER.sleep_on(&q2);
                woken2.fetch_add(1, Ordering::SeqCst);
            });
            SCHEDULER.make_runnable(&t);
            threads.push(t);
        }
        settle();
        assert_eq!(q.len(), 3);
        SCHEDULER.broadcast_on(&q);
        settle();
        assert!(q.is_empty());
        assert_eq!(woken.load(Ordering::SeqCst), 3);
    }

    #[derive(Default)]
    struct SpinOrder {
        seen: std::sync::Mutex<Vec<i32>>,
    }

    impl SpinOrder {
        fn record(&self, v: i32) {
            self.seen.lock().unwrap().push(v);
        }
        fn snapshot(&self) -> Vec<i32> {
            self.seen.lock().unwrap().clone()
        }
    }
}
