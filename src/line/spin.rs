//! [`SpinDelay`] implements [`DelayNs`], and so [`Delay`](crate::line::Delay), by busy-waiting on
//! the std monotonic clock.  Sleeping is far too coarse for the bus timings.
use embedded_hal::delay::DelayNs;
use std::hint::spin_loop;
use std::time::{Duration, Instant};

#[derive(Debug, Default, Clone, Copy)]
pub struct SpinDelay;

impl SpinDelay {
    pub fn new() -> Self {
        SpinDelay
    }

    fn spin(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            spin_loop();
        }
    }
}

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.spin(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_us(&mut self, us: u32) {
        self.spin(Duration::from_micros(u64::from(us)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::Delay;

    fn wait<D: Delay>(delay: &mut D, us: u32) {
        delay.delay_us(us);
    }

    #[test]
    fn test_spin_delay_waits_at_least() {
        let mut delay = SpinDelay::new();
        let start = Instant::now();
        wait(&mut delay, 500);
        assert!(start.elapsed() >= Duration::from_micros(500));
    }

    #[test]
    fn test_spin_delay_ns() {
        let mut delay = SpinDelay::new();
        let start = Instant::now();
        DelayNs::delay_ns(&mut delay, 20_000);
        assert!(start.elapsed() >= Duration::from_nanos(20_000));
    }
}
