// Copyright 2026 hibernate Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A dedicated-thread timer for one-shot and fixed-rate repeating tasks.
//!
//! Pending tasks are kept in a set ordered by `(scheduled time, task id)`. A single worker thread pops due tasks and
//! runs them one at a time. A slow task delays every task due after it.
//!
//! Repeating tasks are rescheduled at a fixed rate: the next run is due at `previous scheduled time + delay`, no
//! matter how long the previous run took. An overdue task runs back-to-back until it catches up.

use std::{
    collections::{BTreeMap, HashMap},
    panic::AssertUnwindSafe,
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::error::{Error, ErrorKind, Result};

/// A unit of work run by the [`Timer`].
///
/// The timer only keeps a reference to the task while it is pending. The task is identified by the address of its
/// shared allocation, so scheduling clones of the same `Arc` refers to the same task.
pub trait TimerTask: Send + Sync + 'static {
    /// Run the task on the timer worker thread.
    fn run(&self);
}

impl<F> TimerTask for F
where
    F: Fn() + Send + Sync + 'static,
{
    fn run(&self) {
        self()
    }
}

type TaskId = usize;

fn task_id(task: &Arc<dyn TimerTask>) -> TaskId {
    Arc::as_ptr(task) as *const () as usize
}

struct Token {
    task: Arc<dyn TimerTask>,
    /// `None` for one-shot tasks.
    delay: Option<Duration>,
}

#[derive(Default)]
struct State {
    tokens: BTreeMap<(Instant, TaskId), Token>,
    /// Scheduled time of every pending task.
    tasks: HashMap<TaskId, Instant>,

    running: Option<TaskId>,
    /// Set when the running task is cancelled mid-run. Suppresses its reschedule.
    running_cancelled: bool,

    destroyed: bool,
}

impl State {
    fn insert(&mut self, id: TaskId, at: Instant, token: Token) {
        self.tasks.insert(id, at);
        self.tokens.insert((at, id), token);
    }

    fn is_next_due(&self, at: Instant, id: TaskId) -> bool {
        self.tokens.first_key_value().map(|(&key, _)| key) == Some((at, id))
    }
}

struct Shared {
    state: Mutex<State>,
    wakeup: Condvar,
}

/// A timer that runs scheduled tasks on one dedicated worker thread.
///
/// # Examples
///
/// ```
/// # use std::{sync::{Arc, atomic::{AtomicUsize, Ordering}}, time::Duration};
/// # use hibernate_common::timer::{Timer, TimerTask};
/// let timer = Timer::new().unwrap();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let task: Arc<dyn TimerTask> = {
///     let hits = hits.clone();
///     Arc::new(move || {
///         hits.fetch_add(1, Ordering::Relaxed);
///     })
/// };
/// timer.schedule(task.clone(), Duration::from_secs(60)).unwrap();
/// assert!(timer.cancel(&task).unwrap());
/// timer.destroy();
/// assert_eq!(hits.load(Ordering::Relaxed), 0);
/// ```
pub struct Timer {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Timer")
            .field("pending", &state.tokens.len())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

impl Timer {
    /// Create a timer and start its worker thread.
    pub fn new() -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            wakeup: Condvar::new(),
        });
        let worker = std::thread::Builder::new()
            .name("hibernate-timer".to_string())
            .spawn({
                let shared = shared.clone();
                move || Self::work(&shared)
            })?;
        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Run `task` once after `delay`.
    ///
    /// Fails with [`ErrorKind::ScheduleConflict`] if the task is already pending, with [`ErrorKind::Config`] if the
    /// due time is out of the clock range, and with [`ErrorKind::Closed`] after [`Timer::destroy`].
    pub fn schedule(&self, task: Arc<dyn TimerTask>, delay: Duration) -> Result<()> {
        self.enqueue(task, delay, None)
    }

    /// Run `task` every `delay`, the first run is due after `delay`.
    ///
    /// A zero `delay` runs the task once, like [`Timer::schedule`].
    ///
    /// Fails with [`ErrorKind::ScheduleConflict`] if the task is already pending, and with [`ErrorKind::Closed`]
    /// after [`Timer::destroy`].
    pub fn schedule_repeated(&self, task: Arc<dyn TimerTask>, delay: Duration) -> Result<()> {
        self.enqueue(task, delay, Some(delay))
    }

    fn enqueue(&self, task: Arc<dyn TimerTask>, delay: Duration, repeat: Option<Duration>) -> Result<()> {
        let id = task_id(&task);
        let repeat = repeat.filter(|delay| !delay.is_zero());
        let at = Instant::now().checked_add(delay).ok_or_else(|| {
            Error::new(ErrorKind::Config, "delay out of range").with_context("delay", format!("{delay:?}"))
        })?;

        let mut state = self.shared.state.lock();
        if state.destroyed {
            return Err(Error::closed().with_context("component", "timer"));
        }
        if state.tasks.contains_key(&id) {
            return Err(Error::new(ErrorKind::ScheduleConflict, "the task is already pending"));
        }

        state.insert(id, at, Token { task, delay: repeat });
        if state.is_next_due(at, id) {
            self.shared.wakeup.notify_one();
        }
        tracing::trace!(id, ?delay, repeated = repeat.is_some(), "[timer]: task scheduled");
        Ok(())
    }

    /// Cancel a pending task.
    ///
    /// Returns `true` if the task was pending and all of its future runs are removed. Returns `false` if the task
    /// was never scheduled, has already run to completion, has already been cancelled, or is running right now.
    ///
    /// Cancellation never interrupts a running task. Cancelling a repeating task mid-run lets the current run finish
    /// and suppresses the runs after it.
    ///
    /// Fails with [`ErrorKind::Closed`] after [`Timer::destroy`].
    pub fn cancel(&self, task: &Arc<dyn TimerTask>) -> Result<bool> {
        let id = task_id(task);

        let mut state = self.shared.state.lock();
        if state.destroyed {
            return Err(Error::closed().with_context("component", "timer"));
        }

        if let Some(at) = state.tasks.remove(&id) {
            state.tokens.remove(&(at, id));
            tracing::trace!(id, "[timer]: task cancelled");
            return Ok(true);
        }

        if state.running == Some(id) {
            state.running_cancelled = true;
        }
        Ok(false)
    }

    /// Stop the worker thread and drop all pending tasks without running them.
    ///
    /// Waits for a running task to finish. Calling `destroy` more than once is a no-op, it is also called on drop.
    pub fn destroy(&self) {
        {
            let mut state = self.shared.state.lock();
            if !state.destroyed {
                state.destroyed = true;
                state.tasks.clear();
                state.tokens.clear();
            }
            self.shared.wakeup.notify_all();
        }

        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        // A task that destroys its own timer can't wait for itself.
        if worker.thread().id() == std::thread::current().id() {
            return;
        }
        if worker.join().is_err() {
            tracing::error!("[timer]: worker thread panicked");
        }
    }

    fn work(shared: &Shared) {
        let mut state = shared.state.lock();
        loop {
            if state.destroyed {
                break;
            }

            let next = state.tokens.first_key_value().map(|(&key, _)| key);
            let Some((at, id)) = next else {
                shared.wakeup.wait(&mut state);
                continue;
            };
            if at > Instant::now() {
                shared.wakeup.wait_until(&mut state, at);
                continue;
            }

            let Some((_, token)) = state.tokens.pop_first() else {
                continue;
            };
            state.tasks.remove(&id);
            state.running = Some(id);
            state.running_cancelled = false;

            Self::run(&mut state, id, &token.task);

            state.running = None;
            if let Some(delay) = token.delay {
                // A task rescheduled by hand during its own run keeps the new schedule.
                if !state.destroyed && !state.running_cancelled && !state.tasks.contains_key(&id) {
                    match at.checked_add(delay) {
                        Some(next) => state.insert(id, next, token),
                        None => tracing::warn!(id, ?delay, "[timer]: next run out of range, task dropped"),
                    }
                }
            }
        }
        tracing::debug!("[timer]: worker exits");
    }

    fn run(state: &mut MutexGuard<'_, State>, id: TaskId, task: &Arc<dyn TimerTask>) {
        MutexGuard::unlocked(state, || {
            let now = Instant::now();
            if std::panic::catch_unwind(AssertUnwindSafe(|| task.run())).is_err() {
                tracing::error!(id, "[timer]: task panicked");
            }
            tracing::trace!(id, elapsed = ?now.elapsed(), "[timer]: task finished");
        });
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<Timer>();
    }

    fn counting() -> (Arc<AtomicUsize>, Arc<dyn TimerTask>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let task: Arc<dyn TimerTask> = {
            let runs = runs.clone();
            Arc::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };
        (runs, task)
    }

    #[test_log::test]
    fn test_one_shot() {
        let timer = Timer::new().unwrap();
        let (runs, task) = counting();

        timer.schedule(task.clone(), Duration::from_millis(20)).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Already ran to completion.
        assert!(!timer.cancel(&task).unwrap());
        // Not pending anymore, so it can be scheduled again.
        timer.schedule(task, Duration::ZERO).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test_log::test]
    fn test_cancel_before_fire() {
        let timer = Timer::new().unwrap();
        let (runs, task) = counting();

        timer.schedule(task.clone(), Duration::from_millis(100)).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(timer.cancel(&task).unwrap());
        assert!(!timer.cancel(&task).unwrap());

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test_log::test]
    fn test_never_scheduled_cancel() {
        let timer = Timer::new().unwrap();
        let (_, task) = counting();
        assert!(!timer.cancel(&task).unwrap());
    }

    #[test_log::test]
    fn test_schedule_conflict() {
        let timer = Timer::new().unwrap();
        let (_, task) = counting();

        timer.schedule(task.clone(), Duration::from_secs(10)).unwrap();
        let err = timer.schedule(task.clone(), Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScheduleConflict);
        let err = timer.schedule_repeated(task.clone(), Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScheduleConflict);

        // A distinct allocation of the same closure type is a distinct task.
        let (_, other) = counting();
        timer.schedule(other, Duration::from_secs(10)).unwrap();
    }

    #[test_log::test]
    fn test_zero_repeat_runs_once() {
        let timer = Timer::new().unwrap();
        let (zero_runs, zero) = counting();
        let (other_runs, other) = counting();

        timer.schedule_repeated(zero.clone(), Duration::ZERO).unwrap();
        timer.schedule(other, Duration::from_millis(10)).unwrap();
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(zero_runs.load(Ordering::SeqCst), 1);
        assert_eq!(other_runs.load(Ordering::SeqCst), 1);
        assert!(!timer.cancel(&zero).unwrap());
    }

    #[test_log::test]
    fn test_delay_out_of_range() {
        let timer = Timer::new().unwrap();
        let (runs, task) = counting();

        let err = timer.schedule(task.clone(), Duration::MAX).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        let err = timer.schedule_repeated(task.clone(), Duration::MAX).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        // Nothing is left pending, and the timer still works.
        assert!(!timer.cancel(&task).unwrap());
        timer.schedule(task, Duration::ZERO).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test_log::test]
    fn test_due_order() {
        let timer = Timer::new().unwrap();
        let order = Arc::new(Mutex::new(vec![]));
        let gate = Arc::new(AtomicBool::new(false));

        // Block the worker so that both tasks become due at once.
        let blocker: Arc<dyn TimerTask> = {
            let gate = gate.clone();
            Arc::new(move || {
                while !gate.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
            })
        };
        timer.schedule(blocker, Duration::ZERO).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let tasks = (0..4)
            .map(|i| {
                let order = order.clone();
                let task: Arc<dyn TimerTask> = Arc::new(move || order.lock().push(i));
                task
            })
            .collect::<Vec<_>>();
        for (i, task) in tasks.iter().enumerate() {
            timer
                .schedule(task.clone(), Duration::from_millis(10 * (4 - i as u64)))
                .unwrap();
        }
        std::thread::sleep(Duration::from_millis(80));
        gate.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));

        // Due tasks run in ascending scheduled time.
        assert_eq!(*order.lock(), vec![3, 2, 1, 0]);
    }

    #[test_log::test]
    fn test_fixed_rate_without_drift() {
        const PERIOD: Duration = Duration::from_millis(100);
        const RUNS: usize = 10;

        let timer = Timer::new().unwrap();
        let starts = Arc::new(Mutex::new(Vec::<Instant>::new()));
        let task: Arc<dyn TimerTask> = {
            let starts = starts.clone();
            Arc::new(move || {
                starts.lock().push(Instant::now());
                std::thread::sleep(Duration::from_millis(30));
            })
        };

        let t0 = Instant::now();
        timer.schedule_repeated(task.clone(), PERIOD).unwrap();

        let deadline = t0 + Duration::from_secs(5);
        while starts.lock().len() < RUNS && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        timer.destroy();

        let starts = starts.lock();
        assert!(starts.len() >= RUNS, "only {} runs", starts.len());
        for (i, start) in starts.iter().take(RUNS).enumerate() {
            let expected = PERIOD * (i as u32 + 1);
            let offset = start.duration_since(t0);
            assert!(offset >= expected, "run {i} started early at {offset:?}");
            // A fixed-delay schedule would have drifted by 30ms per run.
            assert!(
                offset < expected + Duration::from_millis(80),
                "run {i} drifted to {offset:?}"
            );
        }
    }

    #[test_log::test]
    fn test_overdue_runs_back_to_back() {
        let timer = Timer::new().unwrap();
        let starts = Arc::new(Mutex::new(Vec::<Instant>::new()));
        let task: Arc<dyn TimerTask> = {
            let starts = starts.clone();
            Arc::new(move || {
                starts.lock().push(Instant::now());
                std::thread::sleep(Duration::from_millis(50));
            })
        };

        let t0 = Instant::now();
        timer.schedule_repeated(task, Duration::from_millis(20)).unwrap();
        std::thread::sleep(Duration::from_millis(330));
        timer.destroy();

        // Runs take 50ms while due every 20ms, no run is skipped, each starts right after the previous.
        let starts = starts.lock();
        assert!(starts.len() >= 4, "only {} runs", starts.len());
        assert!(starts[0].duration_since(t0) >= Duration::from_millis(20));
        for pair in starts.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap >= Duration::from_millis(50) && gap < Duration::from_millis(90), "gap {gap:?}");
        }
    }

    #[test_log::test]
    fn test_cancel_repeated_mid_run() {
        let timer = Timer::new().unwrap();
        let running = Arc::new(AtomicBool::new(false));
        let runs = Arc::new(AtomicUsize::new(0));
        let task: Arc<dyn TimerTask> = {
            let running = running.clone();
            let runs = runs.clone();
            Arc::new(move || {
                running.store(true, Ordering::SeqCst);
                runs.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(100));
                running.store(false, Ordering::SeqCst);
            })
        };

        timer.schedule_repeated(task.clone(), Duration::from_millis(150)).unwrap();

        // Between runs, the task is pending.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!running.load(Ordering::SeqCst));

        // While running, cancel can't remove it.
        while !running.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!timer.cancel(&task).unwrap());
        assert!(running.load(Ordering::SeqCst));

        // The current run completes, nothing runs afterwards.
        std::thread::sleep(Duration::from_millis(400));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!timer.cancel(&task).unwrap());
    }

    #[test_log::test]
    fn test_cancel_repeated_between_runs() {
        let timer = Timer::new().unwrap();
        let (runs, task) = counting();

        timer.schedule_repeated(task.clone(), Duration::from_millis(50)).unwrap();
        std::thread::sleep(Duration::from_millis(175));
        assert!(timer.cancel(&task).unwrap());
        let seen = runs.load(Ordering::SeqCst);
        assert!((2..=4).contains(&seen), "{seen} runs");

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(runs.load(Ordering::SeqCst), seen);
    }

    #[test_log::test]
    fn test_panicking_task() {
        let timer = Timer::new().unwrap();
        let (runs, task) = counting();
        fn bomb() {
            panic!("boom");
        }
        let bomb: Arc<dyn TimerTask> = Arc::new(bomb);

        timer.schedule(bomb, Duration::ZERO).unwrap();
        timer.schedule(task, Duration::from_millis(20)).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test_log::test]
    fn test_destroy() {
        let timer = Timer::new().unwrap();
        let (runs, task) = counting();

        timer.schedule(task.clone(), Duration::from_millis(50)).unwrap();
        timer.destroy();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        assert_eq!(
            timer.schedule(task.clone(), Duration::ZERO).unwrap_err().kind(),
            ErrorKind::Closed
        );
        assert_eq!(
            timer
                .schedule_repeated(task.clone(), Duration::from_millis(1))
                .unwrap_err()
                .kind(),
            ErrorKind::Closed
        );
        assert_eq!(timer.cancel(&task).unwrap_err().kind(), ErrorKind::Closed);

        // Idempotent.
        timer.destroy();
    }

    #[test_log::test]
    fn test_destroy_from_task() {
        let timer = Arc::new(Timer::new().unwrap());
        let done = Arc::new(AtomicBool::new(false));
        let task: Arc<dyn TimerTask> = {
            let timer = Arc::downgrade(&timer);
            let done = done.clone();
            Arc::new(move || {
                if let Some(timer) = timer.upgrade() {
                    timer.destroy();
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        timer.schedule(task, Duration::ZERO).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(
            timer.schedule(Arc::new(|| {}), Duration::ZERO).unwrap_err().kind(),
            ErrorKind::Closed
        );
    }
}
