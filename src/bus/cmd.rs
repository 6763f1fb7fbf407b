//! Classification of the bytes a host sends under attention

use crate::constants::{
    ATN_CHANNEL_MASK, ATN_CODE_CLOSE, ATN_CODE_DATA, ATN_CODE_LISTEN, ATN_CODE_OPEN,
    ATN_CODE_TALK, ATN_CODE_UNLISTEN, ATN_CODE_UNTALK, ATN_DEVICE_MASK,
};

use std::fmt;

/// The `BusCommand` enum classifies every possible attention byte.
///
/// Primary addresses:
/// - `Listen(device)` - `0x20 | device`
/// - `Talk(device)` - `0x40 | device`
/// - `Unlisten` - `0x3f`
/// - `Untalk` - `0x5f`
///
/// Secondary addresses:
/// - `Data(channel)` - `0x60 | channel`
/// - `Close(channel)` - `0xe0 | channel`
/// - `Open(channel)` - `0xf0 | channel`
///
/// Anything else is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusCommand {
    /// Instruct a device to listen
    Listen(u8),
    /// Instruct a device to talk
    Talk(u8),
    /// Instruct all devices to stop listening
    Unlisten,
    /// Instruct all devices to stop talking
    Untalk,
    /// Data follows on a channel - or is wanted from it, after a Talk
    Data(u8),
    /// Close a file on a channel
    Close(u8),
    /// Open a file on a channel.  The filename follows.
    Open(u8),
    /// A byte with no meaning on the bus
    Unknown(u8),
}

impl From<u8> for BusCommand {
    fn from(byte: u8) -> Self {
        let device = byte & ATN_DEVICE_MASK;
        let channel = byte & ATN_CHANNEL_MASK;
        match byte {
            ATN_CODE_UNLISTEN => BusCommand::Unlisten,
            ATN_CODE_UNTALK => BusCommand::Untalk,
            0x20..=0x3e => BusCommand::Listen(device),
            0x40..=0x5e => BusCommand::Talk(device),
            0x60..=0x6f => BusCommand::Data(channel),
            0xe0..=0xef => BusCommand::Close(channel),
            0xf0..=0xff => BusCommand::Open(channel),
            _ => BusCommand::Unknown(byte),
        }
    }
}

impl From<BusCommand> for u8 {
    fn from(cmd: BusCommand) -> Self {
        match cmd {
            BusCommand::Listen(device) => ATN_CODE_LISTEN | (device & ATN_DEVICE_MASK),
            BusCommand::Talk(device) => ATN_CODE_TALK | (device & ATN_DEVICE_MASK),
            BusCommand::Unlisten => ATN_CODE_UNLISTEN,
            BusCommand::Untalk => ATN_CODE_UNTALK,
            BusCommand::Data(channel) => ATN_CODE_DATA | (channel & ATN_CHANNEL_MASK),
            BusCommand::Close(channel) => ATN_CODE_CLOSE | (channel & ATN_CHANNEL_MASK),
            BusCommand::Open(channel) => ATN_CODE_OPEN | (channel & ATN_CHANNEL_MASK),
            BusCommand::Unknown(byte) => byte,
        }
    }
}

impl fmt::Display for BusCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusCommand::Listen(device) => write!(f, "Listen: {device}"),
            BusCommand::Talk(device) => write!(f, "Talk: {device}"),
            BusCommand::Unlisten => write!(f, "Unlisten"),
            BusCommand::Untalk => write!(f, "Untalk"),
            BusCommand::Data(channel) => write!(f, "Data: {channel}"),
            BusCommand::Close(channel) => write!(f, "Close: {channel}"),
            BusCommand::Open(channel) => write!(f, "Open: {channel}"),
            BusCommand::Unknown(byte) => write!(f, "Unknown: 0x{byte:02x}"),
        }
    }
}

impl BusCommand {
    /// Returns the channel for secondary address commands
    #[must_use]
    pub fn channel(&self) -> Option<u8> {
        match self {
            BusCommand::Data(channel) | BusCommand::Close(channel) | BusCommand::Open(channel) => {
                Some(*channel)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_addresses() {
        assert_eq!(BusCommand::from(0x28), BusCommand::Listen(8));
        assert_eq!(BusCommand::from(0x48), BusCommand::Talk(8));
        assert_eq!(BusCommand::from(0x20), BusCommand::Listen(0));
        assert_eq!(BusCommand::from(0x3e), BusCommand::Listen(30));
        assert_eq!(BusCommand::from(0x3f), BusCommand::Unlisten);
        assert_eq!(BusCommand::from(0x5f), BusCommand::Untalk);
    }

    #[test]
    fn test_secondary_addresses() {
        assert_eq!(BusCommand::from(0x6f), BusCommand::Data(15));
        assert_eq!(BusCommand::from(0xe2), BusCommand::Close(2));
        assert_eq!(BusCommand::from(0xf0), BusCommand::Open(0));
        assert_eq!(BusCommand::from(0x60).channel(), Some(0));
        assert_eq!(BusCommand::Unlisten.channel(), None);
    }

    #[test]
    fn test_unknown() {
        for byte in (0x00..=0x1f).chain(0x70..=0xdf) {
            assert_eq!(BusCommand::from(byte), BusCommand::Unknown(byte));
        }
    }

    #[test]
    fn test_encode_masks_out_of_range() {
        assert_eq!(u8::from(BusCommand::Listen(8)), 0x28);
        assert_eq!(u8::from(BusCommand::Data(0x1f)), 0x6f);
    }

    #[test]
    fn test_display() {
        assert_eq!(BusCommand::Open(2).to_string(), "Open: 2");
        assert_eq!(BusCommand::Unknown(0x80).to_string(), "Unknown: 0x80");
    }
}
