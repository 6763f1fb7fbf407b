//! [`Bus`] is the main interface of this crate.  It runs bus cycles: an
//! attention phase, followed by whatever payload transfer the host asked for.
//!
//! Payload content is not the Bus's concern.  It is produced and consumed by
//! a [`ChannelHandler`] supplied by the caller.
use crate::constants::COMMAND_CHANNEL;
use crate::guard::Session;
use crate::line::{Delay, Pins, Port};
use crate::transfer::Transfer;
use atn::{AtnCheck, AtnCmd, AtnParser};
use cmd::BusCommand;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

pub mod atn;
pub mod builder;
pub mod cmd;

pub use builder::{BusBuilder, BusConfig};

/// Implemented by the caller to give the device its behaviour.
///
/// All methods have no-op defaults, so a handler only needs to implement the
/// ones it cares about.
pub trait ChannelHandler {
    /// A file was opened on `channel`.  `name` is the filename as sent, for
    /// example `$` for the directory.
    fn open(&mut self, _channel: u8, _name: &[u8]) {}

    /// A command was sent on the command channel, such as `I0`
    fn command(&mut self, _command: &[u8]) {}

    /// The host wants data from `channel`.  Return the complete payload.  An
    /// empty payload is reported to the host as file not found.
    fn talk(&mut self, _channel: u8) -> Vec<u8> {
        Vec::new()
    }

    /// A byte of data arrived on `channel`
    fn receive(&mut self, _channel: u8, _byte: u8) {}

    /// The host marked the last byte received on `channel` with EOI
    fn end_of_data(&mut self, _channel: u8) {}

    /// `channel` was closed
    fn close(&mut self, _channel: u8) {}

    /// Any other secondary address addressed to this device
    fn other(&mut self, _command: BusCommand) {}
}

/// A [`ChannelHandler`] which does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl ChannelHandler for NullHandler {}

/// The [`Bus`] struct drives this device's side of the IEC serial bus.
/// * [`Bus::service`] runs a single bus cycle
/// * [`Bus::run`] runs bus cycles forever
///
/// Use [`BusBuilder`] to create a new [`Bus`].
#[derive(Debug)]
pub struct Bus<P: Pins, D: Delay> {
    transfer: Transfer<P, D>,
    parser: AtnParser,
    session: Session,
    cmd: AtnCmd,
}

/// Public [`Bus`] functions
impl<P: Pins, D: Delay> Bus<P, D> {
    /// Creates a new bus instance.
    ///
    /// Using [`BusBuilder`] is preferred, as it validates the device number.
    ///
    /// # Args:
    /// * `port` - the bus wires and delay source
    /// * `device_number` - the device number to answer to
    #[must_use]
    pub fn new(port: Port<P, D>, device_number: u8) -> Self {
        trace!("Bus::new device_number {device_number}");
        Bus {
            transfer: Transfer::new(port),
            parser: AtnParser::new(device_number),
            session: Session::new(),
            cmd: AtnCmd::new(),
        }
    }

    /// The device number this bus answers to
    pub fn device_number(&self) -> u8 {
        self.parser.device_number()
    }

    /// State of the most recent transfer
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The command received in the most recent attention phase
    pub fn last_command(&self) -> &AtnCmd {
        &self.cmd
    }

    /// Access the byte transfer engine directly
    pub fn transfer(&mut self) -> &mut Transfer<P, D> {
        &mut self.transfer
    }

    /// Run a single bus cycle.
    ///
    /// If the host is asserting ATN, handles the attention phase and then
    /// any payload transfer, calling `handler` as required.
    ///
    /// # Returns
    /// * [`AtnCheck`] - how the attention phase was classified.  On
    ///   [`AtnCheck::Error`] the cycle was abandoned and the cause is in
    ///   [`Session::last_error`].  A failure during the payload transfer is
    ///   reported through [`Bus::session`].
    pub fn service<H: ChannelHandler>(&mut self, handler: &mut H) -> AtnCheck {
        let check = self
            .parser
            .check(&mut self.transfer, &mut self.session, &mut self.cmd);

        match check {
            AtnCheck::Error => {
                match self.session.last_error() {
                    Some(e) => warn!("ATN command error: {e}"),
                    None => warn!("ATN command error"),
                }
                return check;
            }
            AtnCheck::Idle | AtnCheck::Reset => return check,
            AtnCheck::Cmd | AtnCheck::CmdListen | AtnCheck::CmdTalk => {}
        }

        let command = self.cmd.command();
        debug!(
            "ATN code: 0x{:02x} ({command}) cmd: {} (len: {}) check: {check}",
            self.cmd.code(),
            self.cmd.to_string_lossy(),
            self.cmd.len()
        );

        match command {
            BusCommand::Open(channel) => handler.open(channel, self.cmd.as_bytes()),
            BusCommand::Data(channel) => match check {
                AtnCheck::CmdTalk => self.talk(handler, channel),
                AtnCheck::CmdListen => self.listen(handler, channel),
                _ => {
                    if channel == COMMAND_CHANNEL {
                        handler.command(self.cmd.as_bytes());
                    } else {
                        handler.other(command);
                    }
                }
            },
            BusCommand::Close(channel) => handler.close(channel),
            other => handler.other(other),
        }

        check
    }

    /// Run bus cycles forever
    pub fn run<H: ChannelHandler>(&mut self, handler: &mut H) -> ! {
        info!("Serving IEC bus as device {}", self.device_number());
        loop {
            if self.service(handler) == AtnCheck::Idle {
                self.transfer.poll_delay();
            }
        }
    }
}

/// Private functions for Bus
impl<P: Pins, D: Delay> Bus<P, D> {
    // Send the handler's payload, the last byte with EOI
    fn talk<H: ChannelHandler>(&mut self, handler: &mut H, channel: u8) {
        let payload = handler.talk(channel);
        let Some((last, rest)) = payload.split_last() else {
            self.transfer.send_file_not_found();
            return;
        };

        debug!("Sending {} bytes on channel {channel}", payload.len());
        for byte in rest {
            if let Err(e) = self.transfer.send_byte(&mut self.session, *byte, false) {
                warn!("Talk on channel {channel} failed: {e}");
                return;
            }
        }
        if let Err(e) = self.transfer.send_eoi(&mut self.session, *last) {
            warn!("Talk on channel {channel} failed sending last byte: {e}");
        }
    }

    // Pass received bytes to the handler until EOI
    fn listen<H: ChannelHandler>(&mut self, handler: &mut H, channel: u8) {
        debug!("Receiving data on channel {channel}");
        loop {
            let byte = match self.transfer.receive_byte(&mut self.session) {
                Ok(byte) => byte,
                Err(e) => {
                    warn!("Listen on channel {channel} failed: {e}");
                    return;
                }
            };

            // A byte under attention is addressing, not data, so the host
            // has finished without EOI
            if self.session.atn() {
                debug!(
                    "Attention byte {} ended data on channel {channel}",
                    BusCommand::from(byte)
                );
                self.transfer.drain_atn();
                return;
            }

            handler.receive(channel, byte);
            if self.session.eoi() {
                handler.end_of_data(channel);
                return;
            }
        }
    }
}
