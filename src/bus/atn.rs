//! The attention phase: working out what the host wants from us before any
//! payload moves.
//!
//! [`AtnParser::check`] is called with ATN asserted.  It receives the primary
//! address, ignores anything not addressed to this device, and otherwise
//! receives the secondary address and any command string, classifying the
//! exchange as an [`AtnCheck`].
use crate::bus::cmd::BusCommand;
use crate::constants::{
    ATN_CMD_MAX_LENGTH, ATN_CODE_UNLISTEN, COMMAND_CHANNEL, TIMING_ATN_DELAY, TIMING_ATN_PREDELAY,
};
use crate::error::{Error, ProtocolError};
use crate::guard::Session;
use crate::line::{Delay, Line, Pins};
use crate::transfer::Transfer;

use arrayvec::ArrayVec;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use std::borrow::Cow;
use std::fmt;

/// Outcome of an attention phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtnCheck {
    /// Nothing of our concern was received
    Idle,
    /// A command was received, with any command string
    Cmd,
    /// A command was received and data is coming to us
    CmdListen,
    /// A command was received and we must talk now
    CmdTalk,
    /// The exchange failed.  The host must start again.
    Error,
    /// The bus is being reset.  Reserved: there is no RESET line handling.
    Reset,
}

impl fmt::Display for AtnCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtnCheck::Idle => write!(f, "Idle"),
            AtnCheck::Cmd => write!(f, "Cmd"),
            AtnCheck::CmdListen => write!(f, "CmdListen"),
            AtnCheck::CmdTalk => write!(f, "CmdTalk"),
            AtnCheck::Error => write!(f, "Error"),
            AtnCheck::Reset => write!(f, "Reset"),
        }
    }
}

/// The command received during an attention phase: the secondary address
/// byte, plus any string that followed it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtnCmd {
    code: u8,
    data: ArrayVec<u8, ATN_CMD_MAX_LENGTH>,
}

impl AtnCmd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.code = 0;
        self.data.clear();
    }

    /// The raw secondary address byte
    pub fn code(&self) -> u8 {
        self.code
    }

    /// The secondary address, classified
    pub fn command(&self) -> BusCommand {
        BusCommand::from(self.code)
    }

    /// The command string - a filename, or a command channel command
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The command string, with anything which isn't UTF-8 replaced
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a byte to the command string.  Fails rather than truncates.
    pub fn push(&mut self, byte: u8) -> Result<(), Error> {
        self.data.try_push(byte).map_err(|_| {
            warn!("Attention command exceeded {ATN_CMD_MAX_LENGTH} bytes");
            ProtocolError::CommandOverflow {
                max: ATN_CMD_MAX_LENGTH,
            }
            .into()
        })
    }

    fn set_code(&mut self, code: u8) {
        self.code = code;
    }
}

/// Parses attention phases addressed to a single device number
#[derive(Debug, Clone, Copy)]
pub struct AtnParser {
    device_number: u8,
}

impl AtnParser {
    pub fn new(device_number: u8) -> Self {
        AtnParser { device_number }
    }

    pub fn device_number(&self) -> u8 {
        self.device_number
    }

    /// Run an attention phase.
    ///
    /// # Args:
    /// * `xfer` - the bus
    /// * `session` - holds the error on failure
    /// * `cmd` - reset, then filled in with what was received
    ///
    /// # Returns
    /// * [`AtnCheck`] - the classification.  On [`AtnCheck::Error`] the cause
    ///   is in [`Session::last_error`].
    pub fn check<P: Pins, D: Delay>(
        &self,
        xfer: &mut Transfer<P, D>,
        session: &mut Session,
        cmd: &mut AtnCmd,
    ) -> AtnCheck {
        cmd.reset();
        match self.parse(xfer, session, cmd) {
            Ok(check) => check,
            Err(e) => {
                warn!("Attention phase failed: {e}");
                session.fail(e);
                AtnCheck::Error
            }
        }
    }

    fn parse<P: Pins, D: Delay>(
        &self,
        xfer: &mut Transfer<P, D>,
        session: &mut Session,
        cmd: &mut AtnCmd,
    ) -> Result<AtnCheck, Error> {
        if !xfer.atn_asserted() {
            xfer.release_bus();
            return Ok(AtnCheck::Idle);
        }

        // Acknowledge attention
        xfer.assert(Line::Data);
        xfer.release(Line::Clock);
        xfer.delay_us(TIMING_ATN_PREDELAY);

        let address = xfer.receive_byte(session)?;
        let check = match BusCommand::from(address) {
            BusCommand::Listen(device) if device == self.device_number => {
                self.listen(xfer, session, cmd)?
            }
            BusCommand::Talk(device) if device == self.device_number => {
                self.talk(xfer, session, cmd)?
            }
            other => {
                trace!("Ignoring attention address {other}");
                xfer.delay_us(TIMING_ATN_DELAY);
                xfer.drain_atn();
                AtnCheck::Idle
            }
        };

        xfer.delay_us(TIMING_ATN_DELAY);
        Ok(check)
    }

    fn listen<P: Pins, D: Delay>(
        &self,
        xfer: &mut Transfer<P, D>,
        session: &mut Session,
        cmd: &mut AtnCmd,
    ) -> Result<AtnCheck, Error> {
        let secondary = xfer.receive_byte(session)?;
        cmd.set_code(secondary);

        match BusCommand::from(secondary) {
            BusCommand::Data(channel) if channel != COMMAND_CHANNEL => Ok(AtnCheck::CmdListen),
            BusCommand::Unlisten => Ok(AtnCheck::Idle),
            _ => {
                loop {
                    let byte = xfer.receive_byte(session)?;
                    if session.atn() && byte == ATN_CODE_UNLISTEN {
                        break;
                    }
                    cmd.push(byte)?;
                }
                Ok(AtnCheck::Cmd)
            }
        }
    }

    fn talk<P: Pins, D: Delay>(
        &self,
        xfer: &mut Transfer<P, D>,
        session: &mut Session,
        cmd: &mut AtnCmd,
    ) -> Result<AtnCheck, Error> {
        let secondary = xfer.receive_byte(session)?;
        cmd.set_code(secondary);

        // Anything else sent before ATN is released is more addressing
        while xfer.atn_asserted() {
            if xfer.sample(Line::Clock) {
                let byte = xfer.receive_byte(session)?;
                cmd.push(byte)?;
            } else {
                xfer.poll_delay();
            }
        }

        xfer.turn_around(session)?;
        Ok(AtnCheck::CmdTalk)
    }
}
