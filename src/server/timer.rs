use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Armed,
    Fired,
    Cancelled,
}

/// Single-shot request deadline owned by one connection.
///
/// Disarming happens at most once: either `fire` or `cancel` succeeds, never both.
#[derive(Debug)]
pub struct RequestTimer {
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    state: TimerState,
}

impl RequestTimer {
    /// `None` disables the timer; `setup` then leaves it idle.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            deadline: None,
            state: TimerState::Idle,
        }
    }

    pub fn setup(&mut self) {
        if self.state != TimerState::Idle {
            return;
        }
        if let Some(timeout) = self.timeout {
            self.deadline = Some(Instant::now() + timeout);
            self.state = TimerState::Armed;
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state == TimerState::Armed
    }

    /// Resolves at the deadline while armed; never resolves otherwise.
    pub async fn expired(&self) {
        match (self.state, self.deadline) {
            (TimerState::Armed, Some(deadline)) => tokio::time::sleep_until(deadline).await,
            _ => std::future::pending().await,
        }
    }

    /// Records expiry. Returns `false` if the timer was not armed.
    pub fn fire(&mut self) -> bool {
        self.disarm(TimerState::Fired)
    }

    /// Returns `false` if the timer was not armed.
    pub fn cancel(&mut self) -> bool {
        self.disarm(TimerState::Cancelled)
    }

    fn disarm(&mut self, to: TimerState) -> bool {
        if self.state != TimerState::Armed {
            return false;
        }
        self.state = to;
        self.deadline = None;
        true
    }
}
