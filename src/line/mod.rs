//! The [`line`](crate::line) module provides the lowest layer of the crate:
//! logical access to the open-collector wires of the IEC serial bus.
//!
//! Hardware is reached through two small capability traits, so that the
//! protocol engine can be run against real GPIOs or against the simulated bus
//! in [`sim`]:
//! * [`Pins`] - raw physical access to each wire
//! * [`Delay`] - microsecond delays
//!
//! [`Port`] combines the two and is the only place which knows that asserting
//! a line means driving it low.  Everything above it reasons in terms of
//! asserted and released.

pub mod sim;
pub mod spin;

use embedded_hal::delay::DelayNs;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use spin::SpinDelay;

/// The wires of the IEC serial bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Line {
    /// Attention - asserted by the host to address devices
    Atn,
    /// Clock - driven by the talker
    Clock,
    /// Data - driven by the talker for bits, by listeners for handshakes
    Data,
    /// Service request - wired, but unused by the protocol logic
    Srq,
}

impl Line {
    /// All bus lines, in a fixed order usable for indexing
    pub const ALL: [Line; 4] = [Line::Atn, Line::Clock, Line::Data, Line::Srq];

    /// Index of this line within [`Line::ALL`]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Line::Atn => 0,
            Line::Clock => 1,
            Line::Data => 2,
            Line::Srq => 3,
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Atn => write!(f, "ATN"),
            Line::Clock => write!(f, "CLOCK"),
            Line::Data => write!(f, "DATA"),
            Line::Srq => write!(f, "SRQ"),
        }
    }
}

/// Logical level of a bus line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    /// Someone on the bus is pulling the line low
    Asserted,
    /// Nobody is driving the line, so the pull-up holds it high
    Released,
}

impl Level {
    /// Level of a line from its electrical state
    #[must_use]
    pub const fn from_high(high: bool) -> Self {
        if high {
            Level::Released
        } else {
            Level::Asserted
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Asserted => write!(f, "asserted"),
            Level::Released => write!(f, "released"),
        }
    }
}

/// Raw physical access to the bus wires.
///
/// Each wire is open-collector with an external pull-up.  An implementation
/// either drives the wire low, or stops driving it (typically by switching
/// the GPIO to an input).  It must never drive a wire high.
pub trait Pins {
    /// Actively drive the line low
    fn drive_low(&mut self, line: Line);

    /// Stop driving the line, leaving it to the pull-up and other devices
    fn float(&mut self, line: Line);

    /// Read the electrical level of the line.  True means high.
    fn is_high(&mut self, line: Line) -> bool;
}

/// Microsecond delays.
///
/// The protocol is timed entirely by busy-waiting, so implementations must be
/// accurate to a few microseconds.
///
/// Anything implementing embedded-hal's [`DelayNs`] is a [`Delay`], so a
/// board HAL's delay can be passed straight in.  See [`SpinDelay`] for a std
/// based one.
pub trait Delay {
    /// Block for `us` microseconds
    fn delay_us(&mut self, us: u32);
}

impl<T: DelayNs> Delay for T {
    fn delay_us(&mut self, us: u32) {
        DelayNs::delay_us(self, us);
    }
}

/// A [`Port`] is this device's connection to the bus: the wires plus a
/// source of delays.
#[derive(Debug)]
pub struct Port<P: Pins, D: Delay> {
    pins: P,
    delay: D,
}

impl<P: Pins, D: Delay> Port<P, D> {
    /// Creates a new Port.  All lines are released, so that this device
    /// starts off not interfering with the bus.
    pub fn new(pins: P, delay: D) -> Self {
        let mut port = Port { pins, delay };
        for line in Line::ALL {
            port.release(line);
        }
        port
    }

    /// Pull the line to its asserted level
    pub fn assert(&mut self, line: Line) {
        self.pins.drive_low(line);
    }

    /// Stop asserting the line.  It may remain asserted if another device
    /// is asserting it.
    pub fn release(&mut self, line: Line) {
        self.pins.float(line);
    }

    /// Assert or release the line
    pub fn set(&mut self, line: Line, level: Level) {
        match level {
            Level::Asserted => self.assert(line),
            Level::Released => self.release(line),
        }
    }

    /// Sample the line.  True means released.
    pub fn sample(&mut self, line: Line) -> bool {
        self.pins.is_high(line)
    }

    /// Sample the line as a [`Level`]
    pub fn level(&mut self, line: Line) -> Level {
        Level::from_high(self.sample(line))
    }

    /// Returns true if anyone on the bus is asserting the line
    pub fn is_asserted(&mut self, line: Line) -> bool {
        !self.sample(line)
    }

    /// Block for `us` microseconds
    pub fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }
}
