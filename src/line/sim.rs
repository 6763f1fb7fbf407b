//! [`SimBus`] is a deterministic simulation of the IEC serial bus, used to
//! exercise the protocol engine without hardware.
//!
//! The bus is shared between this device - via [`SimPins`] and [`SimClock`] -
//! and a scripted host running a [`HostScript`].  Time is virtual: it only
//! advances when the device delays.  The host script is stepped on every
//! virtual microsecond and every time the device touches a line, so the host
//! reacts to the device the way a real host would, just without jitter.
//!
//! Lines are wired-AND: a line is asserted if either side drives it.
//!
//! # Example
//!
//! ```rust
//! use iec_device::line::sim::{HostScript, SimBus};
//! use iec_device::line::Port;
//! use iec_device::transfer::Transfer;
//! use iec_device::guard::Session;
//!
//! // Host sends 0x41 to us as a talker, finishing with EOI
//! let mut script = HostScript::new();
//! script.assert(iec_device::line::Line::Clock).send_byte(0x41, true);
//! let bus = SimBus::with_host(script);
//!
//! let mut xfer = Transfer::new(Port::new(bus.device_pins(), bus.clock()));
//! let mut session = Session::new();
//! assert_eq!(xfer.receive_byte(&mut session), Ok(0x41));
//! assert!(session.eoi());
//! ```
use crate::line::{Level, Line, Pins};

use embedded_hal::delay::DelayNs;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default virtual time after which a simulation is considered to have hung
pub const DEFAULT_SIM_DEADLINE_US: u64 = 10_000_000;

/// Time the simulated host holds each bit on the bus (us)
pub const HOST_BIT_TIME: u32 = 60;
/// Time the simulated host waits before starting a non-EOI byte (us)
pub const HOST_NO_EOI_DELAY: u32 = 40;
/// Time the simulated host, as listener, waits before acknowledging EOI (us)
pub const HOST_EOI_DETECT: u32 = 250;
/// Length of the simulated host's EOI acknowledge pulse (us)
pub const HOST_EOI_PULSE: u32 = 60;
/// Time the simulated host waits after releasing ATN before freeing the bus (us)
pub const HOST_ATN_RELEASE_DELAY: u32 = 100;
/// Time the simulated host holds CLOCK after ATN is acknowledged (us)
pub const HOST_ATN_SETTLE: u32 = 1000;

/// A single action of the simulated host
#[derive(Debug, Clone, PartialEq)]
pub enum HostStep {
    /// Drive (or stop driving) a line
    Set(Line, Level),
    /// Do nothing for this many microseconds
    Delay(u32),
    /// Block until the line reaches the level
    WaitFor(Line, Level),
    /// Shift the DATA level into the byte being received, LSB first
    SampleBit,
    /// Store the byte being received
    EndByte,
}

/// A program for the simulated host.
///
/// The lower level methods push individual [`HostStep`]s.  The higher level
/// ones push the complete host side of a protocol exchange.
#[derive(Debug, Clone, Default)]
pub struct HostScript {
    steps: Vec<HostStep>,
}

impl HostScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: HostStep) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn assert(&mut self, line: Line) -> &mut Self {
        self.push(HostStep::Set(line, Level::Asserted))
    }

    pub fn release(&mut self, line: Line) -> &mut Self {
        self.push(HostStep::Set(line, Level::Released))
    }

    pub fn delay(&mut self, us: u32) -> &mut Self {
        self.push(HostStep::Delay(us))
    }

    pub fn wait_for(&mut self, line: Line, level: Level) -> &mut Self {
        self.push(HostStep::WaitFor(line, level))
    }

    /// Start an attention sequence: assert ATN and CLOCK, release DATA, then
    /// wait for a device to acknowledge by asserting DATA.
    pub fn atn_begin(&mut self) -> &mut Self {
        self.assert(Line::Atn)
            .assert(Line::Clock)
            .release(Line::Data)
            .wait_for(Line::Data, Level::Asserted)
            .delay(HOST_ATN_SETTLE)
    }

    /// End an attention sequence and free the bus
    pub fn atn_end(&mut self) -> &mut Self {
        self.release(Line::Atn)
            .delay(HOST_ATN_RELEASE_DELAY)
            .release(Line::Clock)
            .release(Line::Data)
    }

    /// Send a byte as talker.  Expects to be holding CLOCK asserted, as it
    /// is after [`HostScript::atn_begin`] or a previous byte.
    pub fn send_byte(&mut self, byte: u8, eoi: bool) -> &mut Self {
        self.release(Line::Clock).wait_for(Line::Data, Level::Released);
        if eoi {
            // Hold off until the listener has acknowledged the EOI
            self.wait_for(Line::Data, Level::Asserted)
                .wait_for(Line::Data, Level::Released);
        } else {
            self.delay(HOST_NO_EOI_DELAY);
        }
        self.assert(Line::Clock);
        for bit in 0..8 {
            let level = if byte & (1 << bit) != 0 {
                Level::Released
            } else {
                Level::Asserted
            };
            self.push(HostStep::Set(Line::Data, level))
                .delay(HOST_BIT_TIME)
                .release(Line::Clock)
                .delay(HOST_BIT_TIME)
                .assert(Line::Clock);
        }
        self.release(Line::Data).wait_for(Line::Data, Level::Asserted)
    }

    /// Send a sequence of bytes as talker, marking the last with EOI
    pub fn send_bytes_eoi(&mut self, bytes: &[u8]) -> &mut Self {
        for (ii, byte) in bytes.iter().enumerate() {
            self.send_byte(*byte, ii + 1 == bytes.len());
        }
        self
    }

    /// Receive a byte as listener.  Expects to be holding DATA asserted with
    /// the device holding CLOCK asserted.  If `eoi` the host acknowledges an
    /// EOI from the device.
    pub fn receive_byte(&mut self, eoi: bool) -> &mut Self {
        // The talker's CLOCK is still released for the previous byte's last
        // bit, so wait for it to be taken before waiting for ready-to-send
        self.wait_for(Line::Clock, Level::Asserted)
            .wait_for(Line::Clock, Level::Released)
            .release(Line::Data);
        if eoi {
            self.delay(HOST_EOI_DETECT)
                .assert(Line::Data)
                .delay(HOST_EOI_PULSE)
                .release(Line::Data);
        }
        for _ in 0..8 {
            self.wait_for(Line::Clock, Level::Asserted)
                .wait_for(Line::Clock, Level::Released)
                .push(HostStep::SampleBit);
        }
        self.push(HostStep::EndByte).assert(Line::Data)
    }

    /// Switch from talker to listener at the end of a TALK sequence
    pub fn turn_around(&mut self) -> &mut Self {
        self.release(Line::Atn)
            .assert(Line::Data)
            .release(Line::Clock)
            .wait_for(Line::Clock, Level::Asserted)
    }

    /// After the last byte of a talk session, wait for the device to hand
    /// CLOCK back, then send `UNTALK`
    pub fn untalk(&mut self) -> &mut Self {
        self.wait_for(Line::Clock, Level::Asserted)
            .wait_for(Line::Clock, Level::Released)
            .atn_begin()
            .send_byte(crate::constants::ATN_CODE_UNTALK, false)
            .atn_end()
    }

    /// `LISTEN device`, `secondary`, then the payload bytes (with EOI on the
    /// last), then `UNLISTEN` - as used to OPEN a file or send a command.
    pub fn listen_sequence(&mut self, device: u8, secondary: u8, payload: &[u8]) -> &mut Self {
        self.atn_begin()
            .send_byte(crate::constants::ATN_CODE_LISTEN | device, false)
            .send_byte(secondary, false)
            .release(Line::Atn)
            .send_bytes_eoi(payload)
            .assert(Line::Atn)
            .send_byte(crate::constants::ATN_CODE_UNLISTEN, false)
            .atn_end()
    }
}

/// Which side of the bus drove a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Device,
    Host,
}

/// A change in what one side of the bus is doing to a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub at_us: u64,
    pub line: Line,
    pub driver: Driver,
    pub level: Level,
}

#[derive(Debug, Default)]
struct HostRunner {
    steps: VecDeque<HostStep>,
    step_started: Option<u64>,
    shift: u8,
    received: Vec<u8>,
}

#[derive(Debug)]
struct SimState {
    now: u64,
    deadline: u64,
    device_low: [bool; 4],
    host_low: [bool; 4],
    host: HostRunner,
    transitions: Vec<Transition>,
}

impl SimState {
    fn new() -> Self {
        SimState {
            now: 0,
            deadline: DEFAULT_SIM_DEADLINE_US,
            device_low: [false; 4],
            host_low: [false; 4],
            host: HostRunner::default(),
            transitions: Vec::new(),
        }
    }

    fn level(&self, line: Line) -> Level {
        let ii = line.index();
        Level::from_high(!(self.device_low[ii] || self.host_low[ii]))
    }

    fn drive(&mut self, driver: Driver, line: Line, level: Level) {
        let low = level == Level::Asserted;
        let lines = match driver {
            Driver::Device => &mut self.device_low,
            Driver::Host => &mut self.host_low,
        };
        if lines[line.index()] != low {
            lines[line.index()] = low;
            self.transitions.push(Transition {
                at_us: self.now,
                line,
                driver,
                level,
            });
        }
    }

    fn tick(&mut self) {
        self.now += 1;
        if self.now > self.deadline {
            panic!(
                "Bus simulation exceeded deadline of {}us with host steps {:?} pending",
                self.deadline,
                self.host.steps.front()
            );
        }
        self.run_host();
    }

    // Execute host steps until one blocks
    fn run_host(&mut self) {
        while let Some(step) = self.host.steps.front().cloned() {
            match step {
                HostStep::Set(line, level) => self.drive(Driver::Host, line, level),
                HostStep::Delay(us) => {
                    let started = *self.host.step_started.get_or_insert(self.now);
                    if self.now < started + u64::from(us) {
                        return;
                    }
                    self.host.step_started = None;
                }
                HostStep::WaitFor(line, level) => {
                    if self.level(line) != level {
                        return;
                    }
                }
                HostStep::SampleBit => {
                    let bit = if self.level(Line::Data) == Level::Released {
                        0x80
                    } else {
                        0
                    };
                    self.host.shift = (self.host.shift >> 1) | bit;
                }
                HostStep::EndByte => {
                    trace!("Simulated host received 0x{:02x}", self.host.shift);
                    self.host.received.push(self.host.shift);
                    self.host.shift = 0;
                }
            }
            self.host.steps.pop_front();
        }
    }
}

/// A simulated IEC bus with a scripted host attached
#[derive(Debug, Clone)]
pub struct SimBus {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    /// Creates a bus with an idle host, which drives nothing
    pub fn new() -> Self {
        SimBus {
            state: Arc::new(Mutex::new(SimState::new())),
        }
    }

    /// Creates a bus whose host runs the given script
    pub fn with_host(script: HostScript) -> Self {
        let bus = Self::new();
        bus.load_host(script);
        bus
    }

    /// Appends a script to whatever the host still has to do
    pub fn load_host(&self, script: HostScript) {
        let mut state = self.state.lock();
        state.host.steps.extend(script.steps);
        state.run_host();
    }

    /// Sets the virtual time after which the simulation panics
    pub fn set_deadline(&self, us: u64) {
        self.state.lock().deadline = us;
    }

    /// The [`Pins`] this device uses to access the bus
    pub fn device_pins(&self) -> SimPins {
        SimPins {
            state: Arc::clone(&self.state),
        }
    }

    /// The [`Delay`](crate::line::Delay) source this device uses, which advances virtual time
    pub fn clock(&self) -> SimClock {
        SimClock {
            state: Arc::clone(&self.state),
        }
    }

    /// Directly set what the host does to a line, outside of any script
    pub fn host_set(&self, line: Line, level: Level) {
        self.state.lock().drive(Driver::Host, line, level);
    }

    /// Current level of a line
    pub fn level(&self, line: Line) -> Level {
        self.state.lock().level(line)
    }

    /// Current virtual time in microseconds
    pub fn now_us(&self) -> u64 {
        self.state.lock().now
    }

    /// Bytes the host has received from this device
    pub fn host_received(&self) -> Vec<u8> {
        self.state.lock().host.received.clone()
    }

    /// True once the host has executed its whole script
    pub fn host_finished(&self) -> bool {
        self.state.lock().host.steps.is_empty()
    }

    /// The host step currently blocking, if any
    pub fn host_pending(&self) -> Option<HostStep> {
        self.state.lock().host.steps.front().cloned()
    }

    /// Every change either side has made to the lines so far
    pub fn transitions(&self) -> Vec<Transition> {
        self.state.lock().transitions.clone()
    }

    /// Number of times `driver` has moved `line` to `level`
    pub fn count_transitions(&self, line: Line, driver: Driver, level: Level) -> usize {
        self.state
            .lock()
            .transitions
            .iter()
            .filter(|t| t.line == line && t.driver == driver && t.level == level)
            .count()
    }

    /// Advance virtual time without the device doing anything
    pub fn advance(&self, us: u32) {
        let mut state = self.state.lock();
        for _ in 0..us {
            state.tick();
        }
    }
}

/// This device's view of the simulated bus wires
#[derive(Debug, Clone)]
pub struct SimPins {
    state: Arc<Mutex<SimState>>,
}

impl Pins for SimPins {
    fn drive_low(&mut self, line: Line) {
        let mut state = self.state.lock();
        state.drive(Driver::Device, line, Level::Asserted);
        state.run_host();
    }

    fn float(&mut self, line: Line) {
        let mut state = self.state.lock();
        state.drive(Driver::Device, line, Level::Released);
        state.run_host();
    }

    fn is_high(&mut self, line: Line) -> bool {
        let mut state = self.state.lock();
        state.run_host();
        state.level(line) == Level::Released
    }
}

/// Virtual clock for the simulated bus
#[derive(Debug, Clone)]
pub struct SimClock {
    state: Arc<Mutex<SimState>>,
}

impl SimClock {
    fn advance(&mut self, us: u32) {
        let mut state = self.state.lock();
        for _ in 0..us {
            state.tick();
        }
    }
}

// Virtual time moves in whole microseconds
impl DelayNs for SimClock {
    fn delay_ns(&mut self, ns: u32) {
        self.advance(ns.div_ceil(1000));
    }

    fn delay_us(&mut self, us: u32) {
        self.advance(us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_script_runs_in_virtual_time() {
        let mut script = HostScript::new();
        script.assert(Line::Atn).delay(100).release(Line::Atn);
        let bus = SimBus::with_host(script);

        assert_eq!(bus.level(Line::Atn), Level::Asserted);
        bus.advance(99);
        assert_eq!(bus.level(Line::Atn), Level::Asserted);
        bus.advance(1);
        assert_eq!(bus.level(Line::Atn), Level::Released);
        assert!(bus.host_finished());
    }

    #[test]
    fn test_host_waits_for_device() {
        let mut script = HostScript::new();
        script
            .wait_for(Line::Data, Level::Asserted)
            .assert(Line::Clock);
        let bus = SimBus::with_host(script);
        let mut pins = bus.device_pins();

        bus.advance(1000);
        assert_eq!(bus.level(Line::Clock), Level::Released);
        assert_eq!(
            bus.host_pending(),
            Some(HostStep::WaitFor(Line::Data, Level::Asserted))
        );

        pins.drive_low(Line::Data);
        assert_eq!(bus.level(Line::Clock), Level::Asserted);
        assert!(!pins.is_high(Line::Clock));
    }

    #[test]
    fn test_transitions_recorded_per_driver() {
        let bus = SimBus::new();
        let mut pins = bus.device_pins();
        pins.drive_low(Line::Data);
        pins.drive_low(Line::Data);
        pins.float(Line::Data);
        bus.host_set(Line::Data, Level::Asserted);

        assert_eq!(
            bus.count_transitions(Line::Data, Driver::Device, Level::Asserted),
            1
        );
        assert_eq!(
            bus.count_transitions(Line::Data, Driver::Host, Level::Asserted),
            1
        );
        assert_eq!(bus.transitions().len(), 3);
    }

    #[test]
    fn test_clock_advances_whole_microseconds() {
        let bus = SimBus::new();
        let mut clock = bus.clock();
        clock.delay_ns(1500);
        assert_eq!(bus.now_us(), 2);
        clock.delay_us(3);
        assert_eq!(bus.now_us(), 5);
    }

    #[test]
    #[should_panic(expected = "exceeded deadline")]
    fn test_deadline_panics() {
        let bus = SimBus::new();
        bus.set_deadline(10);
        let mut clock = bus.clock();
        clock.delay_us(11);
    }
}
