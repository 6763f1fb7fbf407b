//! Per-cycle session state, and the timeout guard that every handshake wait
//! goes through.
//!
//! A wait which runs out of budget is a protocol violation.  The guard frees
//! the bus, records the error in the [`Session`] and then waits - without
//! bound - for the host to release ATN.  Only the current cycle is lost: the
//! host is responsible for starting a new one.
use crate::constants::{POLL_QUANTUM_US, TIMEOUT_BUDGET_US, TIMEOUT_POLLS};
use crate::error::{Error, ProtocolError};
use crate::line::{Delay, Level, Line, Pins, Port};

use bitflags::bitflags;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

bitflags! {
    /// Flags describing the outcome of the most recent transfer primitive
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SessionFlags: u8 {
        /// The talker signalled End-Or-Identify: this was the last byte
        const EOI = 1 << 0;
        /// ATN was asserted while the byte was transferred
        const ATN = 1 << 1;
        /// A handshake timed out
        const ERROR = 1 << 2;
    }
}

/// Transient state of one bus cycle.
///
/// Reset at the start of each [`crate::transfer::Transfer::receive_byte`] and
/// read by the caller straight after each transfer primitive.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Session {
    flags: SessionFlags,
    last_error: Option<Error>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all flags and any recorded error
    pub fn reset(&mut self) {
        self.flags = SessionFlags::empty();
        self.last_error = None;
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn eoi(&self) -> bool {
        self.flags.contains(SessionFlags::EOI)
    }

    pub fn atn(&self) -> bool {
        self.flags.contains(SessionFlags::ATN)
    }

    pub fn error(&self) -> bool {
        self.flags.contains(SessionFlags::ERROR)
    }

    /// The error which set [`SessionFlags::ERROR`], if any
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    pub(crate) fn set(&mut self, flag: SessionFlags) {
        self.flags.insert(flag);
    }

    /// Record a protocol error.  Any other flags are discarded, as the
    /// transfer they describe did not complete.
    pub fn fail(&mut self, error: Error) {
        self.flags = SessionFlags::ERROR;
        self.last_error = Some(error);
    }
}

/// Poll `line` until it reaches `target`, or the timeout budget runs out.
///
/// # Args:
/// * `port` - the bus
/// * `session` - receives the error flag on timeout
/// * `line` - the line to watch
/// * `target` - the level to wait for
///
/// # Returns
/// * `Ok(())` - as soon as the line is at the target level
/// * `Err(Error)` - on timeout, but only once the host has released ATN
pub fn wait_until<P: Pins, D: Delay>(
    port: &mut Port<P, D>,
    session: &mut Session,
    line: Line,
    target: Level,
) -> Result<(), Error> {
    for _ in 0..TIMEOUT_POLLS {
        if port.level(line) == target {
            return Ok(());
        }
        port.delay_us(POLL_QUANTUM_US);
    }

    warn!("Timed out waiting for {line} to be {target} - releasing bus");
    port.release(Line::Clock);
    port.release(Line::Data);

    let error: Error = ProtocolError::Timeout {
        line,
        target,
        waited_us: TIMEOUT_BUDGET_US,
    }
    .into();
    session.fail(error.clone());

    wait_for_atn_release(port);
    debug!("ATN released after timeout, abandoning cycle");

    Err(error)
}

/// Wait, without bound, until the host releases ATN
pub fn wait_for_atn_release<P: Pins, D: Delay>(port: &mut Port<P, D>) {
    trace!("Waiting for ATN release");
    while port.is_asserted(Line::Atn) {
        port.delay_us(POLL_QUANTUM_US);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::sim::{HostScript, SimBus};

    #[test]
    fn test_wait_until_returns_immediately() {
        let bus = SimBus::new();
        let mut port = Port::new(bus.device_pins(), bus.clock());
        let mut session = Session::new();

        assert_eq!(
            wait_until(&mut port, &mut session, Line::Clock, Level::Released),
            Ok(())
        );
        assert_eq!(bus.now_us(), 0);
        assert!(!session.error());
    }

    #[test]
    fn test_wait_until_sees_change() {
        let mut script = HostScript::new();
        script.assert(Line::Clock).delay(500).release(Line::Clock);
        let bus = SimBus::with_host(script);
        let mut port = Port::new(bus.device_pins(), bus.clock());
        let mut session = Session::new();

        assert_eq!(
            wait_until(&mut port, &mut session, Line::Clock, Level::Released),
            Ok(())
        );
        let now = bus.now_us();
        assert!((500..500 + u64::from(POLL_QUANTUM_US) + 1).contains(&now));
    }

    #[test]
    fn test_timeout_blocks_until_atn_released() {
        // Host holds ATN for 100ms and never touches CLOCK
        let mut script = HostScript::new();
        script.assert(Line::Atn).delay(100_000).release(Line::Atn);
        let bus = SimBus::with_host(script);
        let mut port = Port::new(bus.device_pins(), bus.clock());
        let mut session = Session::new();
        port.assert(Line::Data);

        let result = wait_until(&mut port, &mut session, Line::Clock, Level::Asserted);

        let error = result.unwrap_err();
        assert!(error.is_timeout());
        assert!(session.error());
        assert_eq!(session.last_error(), Some(&error));
        assert!(bus.now_us() >= 100_000);
        assert_eq!(bus.level(Line::Atn), Level::Released);
        assert_eq!(bus.level(Line::Data), Level::Released);
        assert_eq!(bus.level(Line::Clock), Level::Released);
    }

    #[test]
    fn test_timeout_budget() {
        // ATN never asserted, so the guard returns straight after the budget
        let bus = SimBus::new();
        let mut port = Port::new(bus.device_pins(), bus.clock());
        let mut session = Session::new();

        let result = wait_until(&mut port, &mut session, Line::Data, Level::Asserted);
        assert!(result.is_err());
        assert_eq!(bus.now_us(), u64::from(TIMEOUT_BUDGET_US));
    }

    #[test]
    fn test_session_fail_clears_flags() {
        let mut session = Session::new();
        session.set(SessionFlags::EOI | SessionFlags::ATN);
        assert!(session.eoi() && session.atn());

        session.fail(Error::Args {
            message: "test".to_string(),
        });
        assert_eq!(session.flags(), SessionFlags::ERROR);

        session.reset();
        assert_eq!(session.flags(), SessionFlags::empty());
        assert!(session.last_error().is_none());
    }
}
