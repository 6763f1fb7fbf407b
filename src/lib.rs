//! # iec-device
//!
//! This crate lets a microcontroller, or anything else with access to four
//! open-collector GPIO lines, impersonate a peripheral - such as a disk drive -
//! on the Commodore IEC serial bus.  The host computer drives the bus; this
//! crate answers.
//!
//! ## Overview
//!
//! The iec-device crate is structured in layers:
//!
//! - A high-level [`Bus`] interface, which runs bus cycles and hands payload
//!   to a caller supplied [`ChannelHandler`]
//! - The attention phase parser, [`bus::atn`], which works out what the host
//!   wants from the bytes it sends with ATN asserted
//! - The byte transfer engine, [`transfer`], which moves individual bytes in
//!   either direction, with End-Or-Identify signalling
//! - The timeout guard, [`guard`], which every handshake wait goes through
//! - The line layer, [`line`], which abstracts the bus wires and the
//!   microsecond delay source behind the [`Pins`] and [`Delay`] traits
//!
//! ### Key Features
//!
//! - Receive and send bytes as listener or talker, including EOI
//! - LISTEN, TALK, OPEN, CLOSE, DATA, UNLISTEN and UNTALK handling
//! - File not found signalling
//! - Command channel (15) command strings up to [`ATN_CMD_MAX_LENGTH`] bytes
//! - Every handshake is bounded by a timeout, after which the bus is freed
//! - A deterministic bus simulator, [`line::sim`], with a scriptable host
//!
//! ## Getting Started
//!
//! The recommended way to create a new [`Bus`] is through [`BusBuilder`],
//! providing your platform's [`Pins`] and [`Delay`] implementations.
//!
//! ```rust
//! use iec_device::line::sim::SimBus;
//! use iec_device::{AtnCheck, BusBuilder, ChannelHandler};
//!
//! struct Directory;
//!
//! impl ChannelHandler for Directory {
//!     fn talk(&mut self, _channel: u8) -> Vec<u8> {
//!         vec![0x01, 0x08, 0x00, 0x00]
//!     }
//! }
//!
//! let sim = SimBus::new();
//! let mut bus = BusBuilder::new()
//!     .device_number(8)
//!     .build(sim.device_pins(), sim.clock())
//!     .unwrap();
//!
//! // Nothing is asserting ATN, so there's nothing to do
//! assert_eq!(bus.service(&mut Directory), AtnCheck::Idle);
//! ```
//!
//! On real hardware, call [`Bus::run`] instead, which never returns.
//!
//! ## Error Handling
//!
//! The library uses a custom [`Error`] type that covers:
//!
//! - Protocol violations - a handshake which timed out, or an over-long
//!   command string
//! - Invalid parameters - such as an out of range device number
//!
//! A protocol violation abandons the current bus cycle.  The bus is released
//! and, once the host releases ATN, the next cycle can start.  Errors can be
//! mapped to errno values with [`Error::to_errno`].
//!
//! ## Logging
//!
//! The library uses the `log` crate for diagnostic output:
//!
//! - Warn: Protocol violations
//! - Info: Important state changes
//! - Debug: Each bus cycle's command and classification
//! - Trace: Byte and handshake level details
//!
//! To enable logging, use [`env_logger::init`](https://docs.rs/env_logger/latest/env_logger/index.html)
//! and set the `RUST_LOG` environment variable.  Trace logging will disturb
//! bus timing on slow targets.
//!
//! ## Thread Safety
//!
//! A [`Bus`] owns its [`Pins`] and expects to be the only thing driving the
//! lines.  It should be run from a single thread, or single task.
//!
//! ## License
//!
//! This library is licensed under the GNU General Public License Version 3 (GPLv3).

pub mod bus;
pub mod constants;
pub mod error;
pub mod guard;
pub mod line;
pub mod transfer;

pub use crate::bus::atn::{AtnCheck, AtnCmd};
pub use crate::bus::cmd::BusCommand;
pub use crate::bus::{Bus, BusBuilder, BusConfig, ChannelHandler, NullHandler};
pub use crate::constants::ATN_CMD_MAX_LENGTH;
pub use crate::error::{Error, ProtocolError};
pub use crate::guard::{Session, SessionFlags};
pub use crate::line::{Delay, Level, Line, Pins, Port, SpinDelay};

/// A [`Bus`] attached to the simulated bus in [`line::sim`]
pub type SimulatedBus = Bus<line::sim::SimPins, line::sim::SimClock>;
