//!
//! Single-threaded cooperative task loop.
//!
//! Each loop owns one value of state `S` for its whole lifetime; tasks are
//! closures that receive `&mut S`, so shard state is mutated by exactly one
//! thread and never shared. Producers enqueue into a bounded queue and spin
//! when it is full, which is the only back-pressure mechanism in the core.
//! Tasks run to completion; anything that cannot finish synchronously is
//! split into a submit task and a completion task.
//!

use parking_lot::{Condvar, Mutex};
use ruc::*;
use std::{
    collections::VecDeque,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle, ThreadId},
};
use tracing::error;

/// Default logical queue bound, next power of two above the historical
/// 0xF00000 submission window.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1 << 24;

type Task<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

struct Shared<S> {
    name: String,
    queue: Mutex<VecDeque<Task<S>>>,
    capacity: usize,
    wake: Condvar,
    running: AtomicBool,
    tid: Mutex<Option<ThreadId>>,
}

pub struct EventLoop<S> {
    shared: Arc<Shared<S>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S: 'static> EventLoop<S> {
    /// Spawn the loop thread; `init` builds the owned state on that thread.
    pub fn start<F>(name: &str, capacity: usize, init: F) -> Result<Arc<EventLoop<S>>>
    where
        F: FnOnce() -> S + Send + 'static,
    {
        let shared = Arc::new(Shared {
            name: name.to_owned(),
            queue: Mutex::new(VecDeque::with_capacity(1024)),
            capacity: capacity.next_power_of_two().max(4),
            wake: Condvar::new(),
            running: AtomicBool::new(true),
            tid: Mutex::new(None),
        });

        let sh = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                *sh.tid.lock() = Some(thread::current().id());
                let mut state = init();
                run(&sh, &mut state);
            })
            .c(d!())?;

        Ok(Arc::new(EventLoop {
            shared,
            handle: Mutex::new(Some(handle)),
        }))
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[inline(always)]
    fn on_loop_thread(&self) -> bool {
        *self.shared.tid.lock() == Some(thread::current().id())
    }

    /// Enqueue a task and wake the loop, spinning while the queue is full.
    /// Tasks submitted after `stop` are dropped.
    pub fn schedule_nowait<F>(&self, f: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let task: Task<S> = Box::new(f);
        loop {
            if !self.shared.running.load(Ordering::Acquire) {
                return;
            }
            {
                let mut q = self.shared.queue.lock();
                if q.len() < self.shared.capacity {
                    q.push_back(task);
                    break;
                }
            }
            std::hint::spin_loop();
        }
        self.shared.wake.notify_one();
    }

    /// Enqueue a stateless task and block the caller until it has run.
    /// Short-circuits to a direct call when invoked from the loop's own
    /// thread.
    pub fn schedule_wait<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.on_loop_thread() {
            return f();
        }

        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        self.schedule_nowait(move |_s| {
            let _ = tx.send(f());
        });
        match rx.recv() {
            Ok(r) => r,
            Err(_) => panic!("event loop {} stopped while a caller was waiting", self.name()),
        }
    }

    /// Drain outstanding tasks and join the thread.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        // notify under the queue lock so the loop cannot park between its
        // running check and the wakeup
        {
            let _q = self.shared.queue.lock();
            self.shared.wake.notify_one();
        }
        if let Some(h) = self.handle.lock().take() {
            let _ = h.join();
        }
    }
}

fn run<S>(shared: &Shared<S>, state: &mut S) {
    loop {
        let batch: Vec<Task<S>> = {
            let mut q = shared.queue.lock();
            while q.is_empty() && shared.running.load(Ordering::Acquire) {
                shared.wake.wait(&mut q);
            }
            if q.is_empty() {
                // stopped and drained
                return;
            }
            q.drain(..).collect()
        };

        for task in batch {
            if catch_unwind(AssertUnwindSafe(|| task(state))).is_err() {
                error!("task panicked on loop {}", shared.name);
            }
        }
    }
}

impl<S> Drop for EventLoop<S> {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        {
            let _q = self.shared.queue.lock();
            self.shared.wake.notify_one();
        }
        if let Some(h) = self.handle.lock().take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn tasks_see_loop_owned_state_in_order() {
        let el = pnk!(EventLoop::start("t-order", 1024, || Vec::<u32>::new()));
        for i in 0..100u32 {
            el.schedule_nowait(move |v| v.push(i));
        }
        let (tx, rx) = mpsc::channel();
        el.schedule_nowait(move |v| {
            let _ = tx.send(v.clone());
        });
        let seen = rx.recv().unwrap();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
        el.stop();
    }

    #[test]
    fn schedule_wait_returns_the_value() {
        let el = pnk!(EventLoop::start("t-wait", 64, || ()));
        let r = el.schedule_wait(|| 41 + 1);
        assert_eq!(r, 42);
        el.stop();
    }

    #[test]
    fn schedule_wait_acts_as_a_barrier() {
        let el = pnk!(EventLoop::start("t-barrier", 64, || 0u64));
        for _ in 0..50 {
            el.schedule_nowait(|n| *n += 1);
        }
        el.schedule_wait(|| ());
        let (tx, rx) = mpsc::channel();
        el.schedule_nowait(move |n| {
            let _ = tx.send(*n);
        });
        assert_eq!(rx.recv().unwrap(), 50);
        el.stop();
    }

    #[test]
    fn panicking_task_does_not_kill_the_loop() {
        let el = pnk!(EventLoop::start("t-panic", 64, || ()));
        el.schedule_nowait(|_| panic!("boom"));
        let r = el.schedule_wait(|| "alive");
        assert_eq!(r, "alive");
        el.stop();
    }

    #[test]
    fn stop_drains_pending_tasks() {
        let el = pnk!(EventLoop::start("t-drain", 1024, || ()));
        let (tx, rx) = mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            el.schedule_nowait(move |_| {
                let _ = tx.send(i);
            });
        }
        el.stop();
        drop(tx);
        let got: Vec<i32> = rx.iter().collect();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
    }
}
