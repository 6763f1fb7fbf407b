//! Complete host sessions run through `Bus::service` against the simulated bus
use iec_device::constants::{
    ATN_CODE_CLOSE, ATN_CODE_DATA, ATN_CODE_LISTEN, ATN_CODE_OPEN, ATN_CODE_TALK,
    ATN_CODE_UNLISTEN, ATN_CODE_UNTALK, COMMAND_CHANNEL, SAVE_CHANNEL,
};
use iec_device::line::sim::{HostScript, SimBus};
use iec_device::{AtnCheck, BusBuilder, BusCommand, ChannelHandler, Level, Line, SimulatedBus};

const DEVICE: u8 = 8;
const GAP: u32 = 1000;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Open(u8, Vec<u8>),
    Command(Vec<u8>),
    Talk(u8),
    Receive(u8, u8),
    EndOfData(u8),
    Close(u8),
    Other(BusCommand),
}

#[derive(Debug, Default)]
struct Recorder {
    events: Vec<Event>,
    payload: Vec<u8>,
}

impl ChannelHandler for Recorder {
    fn open(&mut self, channel: u8, name: &[u8]) {
        self.events.push(Event::Open(channel, name.to_vec()));
    }

    fn command(&mut self, command: &[u8]) {
        self.events.push(Event::Command(command.to_vec()));
    }

    fn talk(&mut self, channel: u8) -> Vec<u8> {
        self.events.push(Event::Talk(channel));
        self.payload.clone()
    }

    fn receive(&mut self, channel: u8, byte: u8) {
        self.events.push(Event::Receive(channel, byte));
    }

    fn end_of_data(&mut self, channel: u8) {
        self.events.push(Event::EndOfData(channel));
    }

    fn close(&mut self, channel: u8) {
        self.events.push(Event::Close(channel));
    }

    fn other(&mut self, command: BusCommand) {
        self.events.push(Event::Other(command));
    }
}

fn setup(script: HostScript) -> (SimBus, SimulatedBus) {
    let sim = SimBus::with_host(script);
    let bus = BusBuilder::new()
        .device_number(DEVICE)
        .build(sim.device_pins(), sim.clock())
        .unwrap();
    (sim, bus)
}

// Service the bus until the host has finished, returning every cycle which
// wasn't idle
fn run(sim: &SimBus, bus: &mut SimulatedBus, handler: &mut Recorder) -> Vec<AtnCheck> {
    let mut checks = Vec::new();
    while !sim.host_finished() {
        match bus.service(handler) {
            AtnCheck::Idle => bus.transfer().poll_delay(),
            check => checks.push(check),
        }
    }
    checks
}

fn talk(script: &mut HostScript, channel: u8, bytes: usize) -> &mut HostScript {
    script
        .delay(GAP)
        .atn_begin()
        .send_byte(ATN_CODE_TALK | DEVICE, false)
        .send_byte(ATN_CODE_DATA | channel, false)
        .turn_around();
    for ii in 0..bytes {
        script.receive_byte(ii + 1 == bytes);
    }
    script.untalk()
}

fn close(script: &mut HostScript, channel: u8) -> &mut HostScript {
    script
        .delay(GAP)
        .atn_begin()
        .send_byte(ATN_CODE_LISTEN | DEVICE, false)
        .send_byte(ATN_CODE_CLOSE | channel, false)
        .send_byte(ATN_CODE_UNLISTEN, false)
        .atn_end()
}

#[test]
fn load_directory() {
    let listing = vec![
        0x01, 0x08, 0x0b, 0x08, 0x00, 0x00, 0x12, 0x22, 0x41, 0x22, 0x00, 0x00, 0x00,
    ];

    let mut script = HostScript::new();
    script.listen_sequence(DEVICE, ATN_CODE_OPEN, b"$");
    talk(&mut script, 0, listing.len());
    close(&mut script, 0);

    let (sim, mut bus) = setup(script);
    let mut handler = Recorder {
        payload: listing.clone(),
        ..Default::default()
    };

    let checks = run(&sim, &mut bus, &mut handler);

    assert_eq!(checks, vec![AtnCheck::Cmd, AtnCheck::CmdTalk, AtnCheck::Cmd]);
    assert_eq!(sim.host_received(), listing);
    assert_eq!(
        handler.events,
        vec![Event::Open(0, b"$".to_vec()), Event::Talk(0), Event::Close(0)]
    );
    assert!(!bus.session().error());
    assert_eq!(sim.level(Line::Atn), Level::Released);
}

#[test]
fn command_then_status() {
    let status = b"00, OK,00,00\r".to_vec();

    let mut script = HostScript::new();
    script.listen_sequence(DEVICE, ATN_CODE_DATA | COMMAND_CHANNEL, b"I0");
    talk(&mut script, COMMAND_CHANNEL, status.len());

    let (sim, mut bus) = setup(script);
    let mut handler = Recorder {
        payload: status.clone(),
        ..Default::default()
    };

    let checks = run(&sim, &mut bus, &mut handler);

    assert_eq!(checks, vec![AtnCheck::Cmd, AtnCheck::CmdTalk]);
    assert_eq!(
        handler.events,
        vec![Event::Command(b"I0".to_vec()), Event::Talk(COMMAND_CHANNEL)]
    );
    assert_eq!(sim.host_received(), status);
}

#[test]
fn save_file() {
    let program = [0x01, 0x08, 0xaa, 0x55];

    let mut script = HostScript::new();
    script
        .listen_sequence(DEVICE, ATN_CODE_OPEN | SAVE_CHANNEL, b"PROG")
        .delay(GAP)
        .atn_begin()
        .send_byte(ATN_CODE_LISTEN | DEVICE, false)
        .send_byte(ATN_CODE_DATA | SAVE_CHANNEL, false)
        .release(Line::Atn)
        .send_bytes_eoi(&program)
        .delay(GAP)
        .atn_begin()
        .send_byte(ATN_CODE_UNLISTEN, false)
        .atn_end();
    close(&mut script, SAVE_CHANNEL);

    let (sim, mut bus) = setup(script);
    let mut handler = Recorder::default();

    let checks = run(&sim, &mut bus, &mut handler);

    assert_eq!(checks, vec![AtnCheck::Cmd, AtnCheck::CmdListen, AtnCheck::Cmd]);
    let mut expected = vec![Event::Open(SAVE_CHANNEL, b"PROG".to_vec())];
    expected.extend(program.iter().map(|b| Event::Receive(SAVE_CHANNEL, *b)));
    expected.push(Event::EndOfData(SAVE_CHANNEL));
    expected.push(Event::Close(SAVE_CHANNEL));
    assert_eq!(handler.events, expected);
}

#[test]
fn file_not_found() {
    let mut script = HostScript::new();
    script
        .listen_sequence(DEVICE, ATN_CODE_OPEN, b"MISSING")
        .delay(GAP)
        .atn_begin()
        .send_byte(ATN_CODE_TALK | DEVICE, false)
        .send_byte(ATN_CODE_DATA, false)
        .turn_around()
        // The device lets go of the bus instead of talking
        .wait_for(Line::Clock, Level::Released)
        .release(Line::Data)
        .delay(GAP)
        .atn_begin()
        .send_byte(ATN_CODE_UNTALK, false)
        .atn_end();
    close(&mut script, 0);

    let (sim, mut bus) = setup(script);
    let mut handler = Recorder::default();

    let checks = run(&sim, &mut bus, &mut handler);

    assert_eq!(checks, vec![AtnCheck::Cmd, AtnCheck::CmdTalk, AtnCheck::Cmd]);
    assert!(sim.host_received().is_empty());
    assert_eq!(
        handler.events,
        vec![
            Event::Open(0, b"MISSING".to_vec()),
            Event::Talk(0),
            Event::Close(0)
        ]
    );
}

#[test]
fn recovers_after_timeout() {
    // The host stalls mid-attention, long enough for the device to give up,
    // then starts again
    let mut script = HostScript::new();
    script
        .atn_begin()
        .delay(70_000)
        .release(Line::Atn)
        .release(Line::Clock)
        .delay(GAP)
        .listen_sequence(DEVICE, ATN_CODE_DATA | COMMAND_CHANNEL, b"UJ");

    let (sim, mut bus) = setup(script);
    let mut handler = Recorder::default();

    let checks = run(&sim, &mut bus, &mut handler);

    assert_eq!(checks, vec![AtnCheck::Error, AtnCheck::Cmd]);
    assert_eq!(handler.events, vec![Event::Command(b"UJ".to_vec())]);
    assert!(!bus.session().error());
    assert_eq!(bus.last_command().as_bytes(), b"UJ");
}
