//! Runs this crate's device side against a simulated Commodore host, which
//! performs the bus traffic of `LOAD"$",8` - or of loading a named file.
//! With `--command` it then sends a command channel command and reads back
//! the drive status, as `OPEN 15,8,15,"I0"` would.
//!
//! The device serves a small in-memory disk.  Whatever the host receives is
//! printed, decoded as a BASIC listing when it is the directory.
//!
//! All logging is done to stdout and can be controlled via the `RUST_LOG`
//! environment variable.  Debug shows each bus cycle, trace shows every byte.
use iec_device::constants::{
    ATN_CODE_CLOSE, ATN_CODE_DATA, ATN_CODE_LISTEN, ATN_CODE_OPEN, ATN_CODE_TALK,
    ATN_CODE_UNLISTEN, ATN_CODE_UNTALK, COMMAND_CHANNEL, LOAD_CHANNEL,
};
use iec_device::line::sim::{HostScript, SimBus};
use iec_device::{AtnCheck, BusBuilder, BusCommand, ChannelHandler, Error, Level, Line};

use clap::Parser;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use std::collections::HashMap;

/// Time the simulated host idles between bus sequences (us)
const HOST_GAP: u32 = 1000;

/// BASIC programs, and so directory listings, load here
const BASIC_LOAD_ADDR: u16 = 0x0801;

/// Drive status after a successful command
const STATUS_OK: &str = "00, OK,00,00";

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Device number to serve as
    #[arg(short, long, default_value_t = 8)]
    device: u8,

    /// File to load
    #[arg(short, long, default_value = "$")]
    load: String,

    /// Command channel command to send after loading, such as I0
    #[arg(short, long)]
    command: Option<String>,

    /// Print every line transition once the session completes
    #[arg(long)]
    trace_lines: bool,
}

/// Builds a directory in the form of a tokenised BASIC program, as a drive
/// returns it for `$`
struct BasicListing {
    addr: u16,
    data: Vec<u8>,
}

impl BasicListing {
    fn new() -> Self {
        let mut data = Vec::new();
        data.extend_from_slice(&BASIC_LOAD_ADDR.to_le_bytes());
        BasicListing {
            addr: BASIC_LOAD_ADDR,
            data,
        }
    }

    // Each line is: link to the next line, line number, text, NUL
    fn line(&mut self, number: u16, text: &[u8]) -> &mut Self {
        let next = self.addr + 2 + 2 + text.len() as u16 + 1;
        self.data.extend_from_slice(&next.to_le_bytes());
        self.data.extend_from_slice(&number.to_le_bytes());
        self.data.extend_from_slice(text);
        self.data.push(0);
        self.addr = next;
        self
    }

    fn header(&mut self, name: &str, id: &str) -> &mut Self {
        let text = format!("\x12\"{name:<16}\" {id} 2A");
        self.line(0, text.as_bytes())
    }

    fn file(&mut self, name: &str, blocks: u16) -> &mut Self {
        let quoted = format!("\"{name}\"");
        let pad = match blocks {
            0..=9 => 3,
            10..=99 => 2,
            _ => 1,
        };
        let text = format!("{:pad$}{quoted:<18} PRG", "");
        self.line(blocks, text.as_bytes())
    }

    fn finish(mut self, blocks_free: u16) -> Vec<u8> {
        self.line(blocks_free, b"BLOCKS FREE.");
        self.data.extend_from_slice(&[0, 0]);
        self.data
    }
}

/// An in-memory disk drive
#[derive(Debug, Default)]
struct DemoDrive {
    files: Vec<(String, Vec<u8>)>,
    open: HashMap<u8, Vec<u8>>,
    saving: HashMap<u8, Vec<u8>>,
    status: String,
}

impl DemoDrive {
    fn new() -> Self {
        let mut drive = DemoDrive {
            status: "73,IEC-DEVICE V0.1,00,00".to_string(),
            ..Default::default()
        };
        // 10 PRINT"HELLO"
        let hello = vec![
            0x01, 0x08, 0x0f, 0x08, 0x0a, 0x00, 0x99, 0x22, 0x48, 0x45, 0x4c, 0x4c, 0x4f, 0x22,
            0x00, 0x00, 0x00,
        ];
        drive.files.push(("HELLO".to_string(), hello));
        drive
    }

    fn directory(&self) -> Vec<u8> {
        let mut listing = BasicListing::new();
        listing.header("IEC-DEVICE", "01");
        for (name, data) in &self.files {
            let blocks = data.len().div_ceil(254) as u16;
            listing.file(name, blocks);
        }
        listing.finish(664)
    }

    // What the host gets from LOAD"name"
    fn contents(&self, name: &[u8]) -> Vec<u8> {
        if name == b"$" {
            return self.directory();
        }
        self.files
            .iter()
            .find(|(file, _)| file.as_bytes() == name)
            .map(|(_, data)| data.clone())
            .unwrap_or_default()
    }
}

impl ChannelHandler for DemoDrive {
    fn open(&mut self, channel: u8, name: &[u8]) {
        info!(
            "Open channel {channel}: {}",
            String::from_utf8_lossy(name)
        );
        self.open.insert(channel, name.to_vec());
    }

    fn command(&mut self, command: &[u8]) {
        info!("Command: {}", String::from_utf8_lossy(command));
        self.status = STATUS_OK.to_string();
    }

    fn talk(&mut self, channel: u8) -> Vec<u8> {
        if channel == COMMAND_CHANNEL {
            return format!("{}\r", self.status).into_bytes();
        }
        match self.open.get(&channel) {
            Some(name) => self.contents(name),
            None => {
                warn!("Talk on unopened channel {channel}");
                Vec::new()
            }
        }
    }

    fn receive(&mut self, channel: u8, byte: u8) {
        self.saving.entry(channel).or_default().push(byte);
    }

    fn end_of_data(&mut self, channel: u8) {
        let len = self.saving.get(&channel).map_or(0, Vec::len);
        info!("Received {len} bytes on channel {channel}");
    }

    fn close(&mut self, channel: u8) {
        info!("Close channel {channel}");
        self.open.remove(&channel);
    }

    fn other(&mut self, command: BusCommand) {
        debug!("Ignoring {command}");
    }
}

// The host side of LOAD: OPEN, TALK and read to EOI, UNTALK, CLOSE
fn load_script(device: u8, name: &[u8], expected: usize) -> HostScript {
    let mut script = HostScript::new();
    script
        .listen_sequence(device, ATN_CODE_OPEN | LOAD_CHANNEL, name)
        .delay(HOST_GAP)
        .atn_begin()
        .send_byte(ATN_CODE_TALK | device, false)
        .send_byte(ATN_CODE_DATA | LOAD_CHANNEL, false)
        .turn_around();

    if expected == 0 {
        // File not found: the device lets go of the bus rather than talk
        script
            .wait_for(Line::Clock, Level::Released)
            .release(Line::Data)
            .delay(HOST_GAP)
            .atn_begin()
            .send_byte(ATN_CODE_UNTALK, false)
            .atn_end();
    } else {
        for ii in 0..expected {
            script.receive_byte(ii + 1 == expected);
        }
        script.untalk();
    }

    script
        .delay(HOST_GAP)
        .atn_begin()
        .send_byte(ATN_CODE_LISTEN | device, false)
        .send_byte(ATN_CODE_CLOSE | LOAD_CHANNEL, false)
        .send_byte(ATN_CODE_UNLISTEN, false)
        .atn_end();
    script
}

// The host side of OPEN 15,8,15,"command" followed by reading the status
fn command_script(script: &mut HostScript, device: u8, command: &[u8], status_len: usize) {
    script
        .delay(HOST_GAP)
        .listen_sequence(device, ATN_CODE_DATA | COMMAND_CHANNEL, command)
        .delay(HOST_GAP)
        .atn_begin()
        .send_byte(ATN_CODE_TALK | device, false)
        .send_byte(ATN_CODE_DATA | COMMAND_CHANNEL, false)
        .turn_around();
    for ii in 0..status_len {
        script.receive_byte(ii + 1 == status_len);
    }
    script.untalk();
}

// Decode a tokenised BASIC listing as a directory, ignoring the tokens
fn print_listing(data: &[u8]) {
    let mut lines = data.get(2..).unwrap_or_default();
    while lines.len() >= 4 && (lines[0] != 0 || lines[1] != 0) {
        let number = u16::from_le_bytes([lines[2], lines[3]]);
        let rest = &lines[4..];
        let end = rest.iter().position(|b| *b == 0).unwrap_or(rest.len());
        let text: String = rest[..end]
            .iter()
            .filter(|b| **b != 0x12)
            .map(|b| *b as char)
            .collect();
        println!("{number} {text}");
        lines = rest.get(end + 1..).unwrap_or_default();
    }
}

fn print_hex(data: &[u8]) {
    for (ii, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        println!("{:04x}: {}", ii * 16, hex.join(" "));
    }
}

fn execute(args: &Args) -> Result<(), Error> {
    let mut drive = DemoDrive::new();
    let expected = drive.contents(args.load.as_bytes());

    let mut script = load_script(args.device, args.load.as_bytes(), expected.len());
    if let Some(command) = &args.command {
        let status_len = STATUS_OK.len() + 1;
        command_script(&mut script, args.device, command.as_bytes(), status_len);
    }

    let sim = SimBus::with_host(script);
    let mut bus = BusBuilder::new()
        .device_number(args.device)
        .build(sim.device_pins(), sim.clock())?;

    info!("Serving LOAD\"{}\",{}", args.load, args.device);
    while !sim.host_finished() {
        match bus.service(&mut drive) {
            AtnCheck::Idle => bus.transfer().poll_delay(),
            AtnCheck::Error => {
                if let Some(e) = bus.session().last_error() {
                    return Err(e.clone());
                }
            }
            check => debug!("Bus cycle complete: {check}"),
        }
    }
    info!("Host finished after {}us", sim.now_us());

    if args.trace_lines {
        for t in sim.transitions() {
            println!("{:>8}us {:?} {} {}", t.at_us, t.driver, t.line, t.level);
        }
    }

    let received = sim.host_received();
    let (loaded, status) = received.split_at(expected.len().min(received.len()));
    if loaded.is_empty() {
        println!("?FILE NOT FOUND ERROR");
    } else if args.load == "$" {
        print_listing(loaded);
    } else {
        print_hex(loaded);
    }
    if args.command.is_some() {
        println!("Status: {}", String::from_utf8_lossy(status).trim_end());
    }

    Ok(())
}

fn main() {
    env_logger::builder().init();
    let args = Args::parse();

    match execute(&args) {
        Ok(_) => std::process::exit(0),
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
