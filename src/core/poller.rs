use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::cancel::CancelSignal;

/// What woke a [`PollSchedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTick {
    /// Time to check the remote status again.
    Probe,
    DeadlineExceeded,
    Cancelled,
}

/// Scheduled wake-ups for polling a remote run, bounded by an optional
/// deadline and interruptible through a [`CancelSignal`].
///
/// The first tick fires immediately.
#[derive(Debug)]
pub struct PollSchedule {
    ticker: Interval,
    deadline: Option<Instant>,
}

impl PollSchedule {
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticker,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Wait for the next wake-up. Cancellation wins over an expired
    /// deadline, which wins over a due probe.
    pub async fn next(&mut self, cancel: &CancelSignal) -> PollTick {
        let deadline = self.deadline;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => PollTick::Cancelled,
            _ = sleep_until_opt(deadline) => PollTick::DeadlineExceeded,
            _ = self.ticker.tick() => PollTick::Probe,
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_deadline() {
        let cancel = CancelSignal::new();
        let mut schedule = PollSchedule::new(Duration::from_secs(10), Some(Duration::from_secs(35)));
        let mut probes = 0;
        loop {
            match schedule.next(&cancel).await {
                PollTick::Probe => probes += 1,
                PollTick::DeadlineExceeded => break,
                PollTick::Cancelled => panic!("not cancelled"),
            }
        }
        // t = 0, 10, 20, 30
        assert_eq!(probes, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts() {
        let cancel = CancelSignal::new();
        let mut schedule = PollSchedule::new(Duration::from_secs(10), None);
        assert_eq!(schedule.next(&cancel).await, PollTick::Probe);
        cancel.trigger("caller");
        assert_eq!(schedule.next(&cancel).await, PollTick::Cancelled);
    }
}
