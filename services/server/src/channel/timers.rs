//! A re-armable, cancellable deadline backed by a single standing task.
//!
//! Each [`DeadlineTimer`] owns one `tokio::spawn`ed loop that either waits on
//! a deadline or sleeps until woken by [`DeadlineTimer::arm`]/`cancel`. A
//! generation counter guards against a deadline firing after it has already
//! been re-armed to something else (spec.md §9, timer cancellation).

use std::future::Future;
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

struct TimerState {
    generation: u64,
    deadline: Option<Instant>,
    stopped: bool,
}

pub struct DeadlineTimer {
    state: Arc<Mutex<TimerState>>,
    notify: Arc<Notify>,
}

impl DeadlineTimer {
    /// Spawns the backing task. `on_fire` runs each time an armed deadline
    /// elapses without being re-armed or cancelled first.
    pub fn spawn<F, Fut>(mut on_fire: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let state = Arc::new(Mutex::new(TimerState {
            generation: 0,
            deadline: None,
            stopped: false,
        }));
        let notify = Arc::new(Notify::new());
        let task_state = state.clone();
        let task_notify = notify.clone();

        tokio::spawn(async move {
            loop {
                let (deadline, generation, stopped) = {
                    let s = task_state.lock().unwrap();
                    (s.deadline, s.generation, s.stopped)
                };
                if stopped {
                    return;
                }
                match deadline {
                    None => task_notify.notified().await,
                    Some(deadline) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(deadline) => {
                                let fire = {
                                    let mut s = task_state.lock().unwrap();
                                    if s.stopped {
                                        return;
                                    }
                                    if s.generation == generation && s.deadline == Some(deadline) {
                                        s.deadline = None;
                                        true
                                    } else {
                                        false
                                    }
                                };
                                if fire {
                                    on_fire().await;
                                }
                            }
                            _ = task_notify.notified() => {}
                        }
                    }
                }
            }
        });

        Self { state, notify }
    }

    /// Arms (or re-arms) the deadline `duration` from now, bumping the
    /// generation so an in-flight fire of a prior deadline is discarded.
    pub fn arm(&self, duration: Duration) {
        let mut s = self.state.lock().unwrap();
        s.generation += 1;
        s.deadline = Some(Instant::now() + duration);
        drop(s);
        self.notify.notify_one();
    }

    pub fn cancel(&self) {
        let mut s = self.state.lock().unwrap();
        s.generation += 1;
        s.deadline = None;
        drop(s);
        self.notify.notify_one();
    }

    /// Cancels the deadline and stops the backing task permanently.
    pub fn stop(&self) {
        let mut s = self.state.lock().unwrap();
        s.stopped = true;
        s.deadline = None;
        drop(s);
        self.notify.notify_one();
    }
}
