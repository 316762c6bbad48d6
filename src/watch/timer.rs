//! Poll timer driving periodic sync cycles.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::PollConfig;
use crate::constants::POLL_PARKED;

/// Deadline tracker for the control loop's tick. When periodic polling is
/// disabled the deadline is parked far in the future, so cycles only run on
/// explicit request.
#[derive(Debug, Clone)]
pub(crate) struct PollTimer {
    next_deadline: Instant,
    interval: Duration,
    periodic: bool,
}

impl PollTimer {
    pub fn new(config: &PollConfig) -> Self {
        let mut timer = Self {
            next_deadline: Instant::now(),
            interval: config.interval(),
            periodic: config.periodic,
        };
        timer.reset();
        timer
    }

    pub fn reset(&mut self) {
        self.next_deadline = Instant::now() + self.delay();
    }

    pub fn next_deadline(&self) -> Instant {
        self.next_deadline
    }

    pub fn is_expired(&self) -> bool {
        self.next_deadline <= Instant::now()
    }

    fn delay(&self) -> Duration {
        if self.periodic {
            self.interval
        } else {
            POLL_PARKED
        }
    }
}
