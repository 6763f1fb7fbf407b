//! The byte transfer engine: the bit level handshakes used to move a byte
//! across the bus, in either direction.
//!
//! Bytes go LSB first.  The talker holds CLOCK asserted while it sets DATA,
//! and releases CLOCK when the bit is valid.  A released DATA line is a 1.
//!
//! EOI is signalled by the talker holding CLOCK released for longer than
//! [`TIMING_EOI_THRESH`] x [`TIMING_EOI_STEP`] before the first bit, which the
//! listener acknowledges with a single bit-period DATA pulse.
//!
//! Every primitive records its outcome in the caller's [`Session`].  Nothing
//! is kept in the [`Transfer`] between calls.
use crate::constants::{
    POLL_QUANTUM_US, TIMING_BIT, TIMING_EOI_STEP, TIMING_EOI_THRESH, TIMING_EOI_WAIT,
    TIMING_FNF_DELAY, TIMING_NO_EOI, TIMING_STABLE_WAIT,
};
use crate::error::Error;
use crate::guard::{wait_for_atn_release, wait_until, Session, SessionFlags};
use crate::line::{Delay, Level, Line, Pins, Port};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

/// Drives byte transfers over a [`Port`]
#[derive(Debug)]
pub struct Transfer<P: Pins, D: Delay> {
    port: Port<P, D>,
}

impl<P: Pins, D: Delay> Transfer<P, D> {
    pub fn new(port: Port<P, D>) -> Self {
        Transfer { port }
    }

    /// Access the underlying [`Port`]
    pub fn port(&mut self) -> &mut Port<P, D> {
        &mut self.port
    }

    /// Receive a byte, with this device acting as listener.
    ///
    /// # Args:
    /// * `session` - reset, then updated with EOI, ATN and error flags
    ///
    /// # Returns
    /// * `Ok(u8)` - the byte received.  DATA is left asserted, acknowledging it.
    /// * `Err(Error)` - a handshake timed out.  The session error flag is set.
    pub fn receive_byte(&mut self, session: &mut Session) -> Result<u8, Error> {
        trace!("Transfer::receive_byte");
        session.reset();

        // Talker ready to send
        self.wait(session, Line::Clock, Level::Released)?;

        // Ready for data
        self.port.release(Line::Data);

        let mut polls = 0;
        while self.port.sample(Line::Clock) && polls < TIMING_EOI_THRESH {
            self.port.delay_us(TIMING_EOI_STEP);
            polls += 1;
        }

        if polls >= TIMING_EOI_THRESH {
            trace!("EOI detected, acknowledging");
            session.set(SessionFlags::EOI);

            self.port.assert(Line::Data);
            self.port.delay_us(TIMING_BIT);
            self.port.release(Line::Data);

            self.wait(session, Line::Clock, Level::Asserted)?;
        }

        if self.port.is_asserted(Line::Atn) {
            session.set(SessionFlags::ATN);
        }

        let mut data = 0u8;
        for _ in 0..8 {
            data >>= 1;
            self.wait(session, Line::Clock, Level::Released)?;
            if self.port.sample(Line::Data) {
                data |= 1 << 7;
            }
            self.wait(session, Line::Clock, Level::Asserted)?;
        }

        // Frame acknowledge
        self.port.assert(Line::Data);

        trace!("Received byte 0x{data:02x} flags {:?}", session.flags());
        Ok(data)
    }

    /// Send a byte, with this device acting as talker.
    ///
    /// # Args:
    /// * `session` - reset, then receives the error flag on failure
    /// * `data` - the byte to send
    /// * `signal_eoi` - if true, mark this as the last byte
    ///
    /// # Returns
    /// * `Ok(())` - the listener acknowledged the byte
    /// * `Err(Error)` - a handshake timed out
    ///
    /// # Note
    /// A listener may abort a byte by asserting DATA part way through it.
    /// That is not detected: the byte is clocked out in full and the abort
    /// only shows up as a missing or early acknowledge.
    pub fn send_byte(
        &mut self,
        session: &mut Session,
        data: u8,
        signal_eoi: bool,
    ) -> Result<(), Error> {
        trace!("Transfer::send_byte data 0x{data:02x} signal_eoi {signal_eoi}");
        session.reset();

        // Listener present
        self.wait(session, Line::Data, Level::Asserted)?;

        // Ready to send
        self.port.release(Line::Clock);

        // Listener ready for data
        self.wait(session, Line::Data, Level::Released)?;

        if signal_eoi {
            self.port.delay_us(TIMING_EOI_WAIT);
            self.wait(session, Line::Data, Level::Asserted)?;
            self.wait(session, Line::Data, Level::Released)?;
        }

        self.port.delay_us(TIMING_NO_EOI);

        let mut byte = data;
        for _ in 0..8 {
            self.port.assert(Line::Clock);
            let level = if byte & 1 != 0 {
                Level::Released
            } else {
                Level::Asserted
            };
            self.port.set(Line::Data, level);
            self.port.delay_us(TIMING_BIT);

            // Bit valid
            self.port.release(Line::Clock);
            self.port.delay_us(TIMING_BIT);

            byte >>= 1;
        }

        self.port.assert(Line::Clock);
        self.port.release(Line::Data);
        self.port.delay_us(TIMING_STABLE_WAIT);

        // Frame acknowledge
        self.wait(session, Line::Data, Level::Asserted)
    }

    /// Send the last byte of a talk session, with EOI, then hand the bus
    /// back to the host with [`Transfer::undo_turn_around`].
    pub fn send_eoi(&mut self, session: &mut Session, data: u8) -> Result<(), Error> {
        self.send_byte(session, data, true)?;
        self.undo_turn_around(session)
    }

    /// Become talker after being addressed with TALK.
    ///
    /// Waits for the host to release CLOCK, then takes over CLOCK.
    pub fn turn_around(&mut self, session: &mut Session) -> Result<(), Error> {
        trace!("Transfer::turn_around");
        self.wait(session, Line::Clock, Level::Released)?;

        self.port.release(Line::Data);
        self.port.delay_us(TIMING_BIT);
        self.port.assert(Line::Clock);
        self.port.delay_us(TIMING_BIT);

        Ok(())
    }

    /// Return to being a listener at the end of a talk session.
    ///
    /// Waits for the host to take CLOCK back.
    pub fn undo_turn_around(&mut self, session: &mut Session) -> Result<(), Error> {
        trace!("Transfer::undo_turn_around");
        self.port.assert(Line::Data);
        self.port.delay_us(TIMING_BIT);
        self.port.release(Line::Clock);
        self.port.delay_us(TIMING_BIT);

        self.wait(session, Line::Clock, Level::Asserted)
    }

    /// Tell the host the requested file does not exist, by releasing the bus
    /// instead of starting a transfer.
    pub fn send_file_not_found(&mut self) {
        debug!("Signalling file not found");
        self.port.release(Line::Data);
        self.port.release(Line::Clock);
        self.port.delay_us(TIMING_FNF_DELAY);
    }

    /// Release CLOCK and DATA
    pub fn release_bus(&mut self) {
        self.port.release(Line::Data);
        self.port.release(Line::Clock);
    }

    /// Release CLOCK and DATA, then wait without bound for the host to
    /// release ATN
    pub fn drain_atn(&mut self) {
        self.release_bus();
        wait_for_atn_release(&mut self.port);
    }

    /// Returns true if the host is asserting ATN
    pub fn atn_asserted(&mut self) -> bool {
        self.port.is_asserted(Line::Atn)
    }

    /// Sample a line.  True means released.
    pub fn sample(&mut self, line: Line) -> bool {
        self.port.sample(line)
    }

    pub fn assert(&mut self, line: Line) {
        self.port.assert(line);
    }

    pub fn release(&mut self, line: Line) {
        self.port.release(line);
    }

    pub fn delay_us(&mut self, us: u32) {
        self.port.delay_us(us);
    }

    /// Delay for one polling quantum
    pub fn poll_delay(&mut self) {
        self.port.delay_us(POLL_QUANTUM_US);
    }

    fn wait(&mut self, session: &mut Session, line: Line, target: Level) -> Result<(), Error> {
        wait_until(&mut self.port, session, line, target)
    }
}
