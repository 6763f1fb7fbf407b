//! Constants used in the IEC device implementation

/// Bus timings
///
/// These are electrical tolerances of the Commodore serial bus, not policy.
/// Changing them breaks interoperability with real hosts.

/// Bit clock high/low hold time (us)
pub const TIMING_BIT: u32 = 70;
/// Delay before clocking out the first bit of a byte (us)
pub const TIMING_NO_EOI: u32 = 20;
/// Delay a talker waits for the listener to acknowledge EOI (us)
pub const TIMING_EOI_WAIT: u32 = 200;
/// Number of [`TIMING_EOI_STEP`] polls of CLOCK released that signal EOI
pub const TIMING_EOI_THRESH: u32 = 20;
/// Poll interval used while detecting EOI (us)
pub const TIMING_EOI_STEP: u32 = 10;
/// Line stabilization time before checking the final acknowledge (us)
pub const TIMING_STABLE_WAIT: u32 = 20;
/// Delay required after acknowledging ATN, before receiving (us)
pub const TIMING_ATN_PREDELAY: u32 = 50;
/// Delay required after an ATN sequence (us)
pub const TIMING_ATN_DELAY: u32 = 100;
/// Delay after signalling file not found (us)
pub const TIMING_FNF_DELAY: u32 = 100;

/// Polling quantum used by every wait on the bus (us)
pub const POLL_QUANTUM_US: u32 = 2;
/// Total budget for a single bounded wait on a line (us)
pub const TIMEOUT_BUDGET_US: u32 = 65_000;
/// Number of polls the timeout budget allows
pub const TIMEOUT_POLLS: u32 = TIMEOUT_BUDGET_US / POLL_QUANTUM_US;

/// Attention (ATN) command codes

/// LISTEN, ORed with the device number
pub const ATN_CODE_LISTEN: u8 = 0x20;
/// TALK, ORed with the device number
pub const ATN_CODE_TALK: u8 = 0x40;
/// DATA (secondary address), ORed with the channel
pub const ATN_CODE_DATA: u8 = 0x60;
/// CLOSE, ORed with the channel
pub const ATN_CODE_CLOSE: u8 = 0xe0;
/// OPEN, ORed with the channel
pub const ATN_CODE_OPEN: u8 = 0xf0;
/// UNLISTEN - all devices stop listening
pub const ATN_CODE_UNLISTEN: u8 = 0x3f;
/// UNTALK - all devices stop talking
pub const ATN_CODE_UNTALK: u8 = 0x5f;

/// Mask selecting the channel part of a secondary address
pub const ATN_CHANNEL_MASK: u8 = 0x0f;
/// Mask selecting the device number of a primary address
pub const ATN_DEVICE_MASK: u8 = 0x1f;

/// Maximum length of a command string received under attention
pub const ATN_CMD_MAX_LENGTH: usize = 40;

/// Minimum and maximum device numbers

/// Default device number - the first disk drive
pub const DEFAULT_DEVICE_NUM: u8 = 8;

/// Minimum device number this crate will impersonate.  Devices lower than 4
/// are built in to the host (keyboard, tape, RS-232, screen)
pub const MIN_DEVICE_NUM: u8 = 4;

/// Maximum device number.  31 cannot be used as LISTEN/TALK 31 are the
/// UNLISTEN and UNTALK codes
pub const MAX_DEVICE_NUM: u8 = 30;

/// Well known channels

/// Channel used for LOAD - such as $ for directory listing
pub const LOAD_CHANNEL: u8 = 0;

/// Channel used for SAVE
pub const SAVE_CHANNEL: u8 = 1;

/// Command channel, used for commands like `I0` and for reading drive status
pub const COMMAND_CHANNEL: u8 = 15;
