use clap::{App, Arg};
use roverlink::bus::sim::SimulatedMaster;
use roverlink::bus::{Diagnostics, MessagePair, SharedBusSlave};
use roverlink::channel::ChannelError;
use roverlink::{BusConfig, ChannelConfig, InstructionChannel};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time;
use tracing::{debug, error, info, warn};

const CONTROL_PERIOD_MS: u64 = 20;

// Name tags for the motor controller.
const NAME_THROTTLE: u16 = 0xFFF1;
const NAME_STEERING: u16 = 0xFFF2;

// Signed commands are sent offset so they never fall in the name-tag range.
const VALUE_OFFSET: f64 = 1000.0;

static BUS: SharedBusSlave = SharedBusSlave::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlExit {
    EmergencyStop,
    ConnectionLost,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("roverlink-vehicle")
        .version("0.1.0")
        .about("Vehicle side of the instruction channel with a simulated motor bus")
        .arg(
            Arg::with_name("host")
                .long("host")
                .value_name("HOST")
                .help("Address to listen on")
                .takes_value(true)
                .default_value(roverlink::config::DEFAULT_HOST),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Instruction port")
                .takes_value(true)
                .default_value("2526"),
        )
        .arg(
            Arg::with_name("address")
                .short("a")
                .long("address")
                .value_name("ADDR")
                .help("Bus slave address (decimal)")
                .takes_value(true)
                .default_value("8"),
        )
        .get_matches();

    let config = ChannelConfig {
        host: matches.value_of("host").unwrap_or(roverlink::config::DEFAULT_HOST).to_string(),
        port: matches.value_of("port").unwrap_or("2526").parse::<u16>()?,
        ..ChannelConfig::default()
    };
    let bus_config = BusConfig {
        slave_address: matches.value_of("address").unwrap_or("8").parse::<u8>()?,
    };

    let mut master = SimulatedMaster::new(&BUS);
    master.init(&bus_config);

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("listening for instructions on {}", listener.local_addr()?);

    loop {
        let channel = InstructionChannel::accept(&listener, &config).await?;
        info!("client connected: {}", channel.peer_addr());

        let exit = run_control_loop(&channel, &mut master).await;
        let reader_exit = channel.shutdown().await;
        debug!("reader exit: {:?}", reader_exit);

        match exit {
            ControlExit::EmergencyStop => {
                warn!("emergency stop, halting vehicle");
                break;
            }
            ControlExit::ConnectionLost => {
                warn!("connection lost, waiting for a new client");
            }
        }
    }

    println!("Vehicle stopped");
    Ok(())
}

async fn run_control_loop(channel: &InstructionChannel, master: &mut SimulatedMaster<'_>) -> ControlExit {
    let mut interval = time::interval(Duration::from_millis(CONTROL_PERIOD_MS));
    let mut reported = Diagnostics::empty();

    loop {
        interval.tick().await;

        if channel.emergency_received() {
            halt(master);
            drain_bus(master, &mut reported);
            return ControlExit::EmergencyStop;
        }
        if channel.has_lost_connection() {
            return ControlExit::ConnectionLost;
        }

        if let Err(e) = handle_instructions(channel).await {
            error!("failed to answer client: {}", e);
        }

        drain_bus(master, &mut reported);
    }
}

async fn handle_instructions(channel: &InstructionChannel) -> Result<(), ChannelError> {
    if channel.new_parameters() {
        let params = channel.parameter_configuration();
        info!("new parameters: {:?}", params);
        channel.write_formatted("Info", "Parameters updated").await?;
    }
    if channel.new_manual_instruction() {
        let inst = channel.manual_drive_instruction();
        send_drive(inst.throttle, inst.steering);
    }
    if channel.new_semi_instruction() {
        let inst = channel.semi_drive_instruction();
        channel.send_instruction_id(&inst.id).await?;
    }
    if channel.new_drive_mission() {
        let mission = channel.drive_mission();
        let message = format!("Mission {} accepted with {} waypoints", mission.id, mission.waypoints.len());
        channel.write_formatted("Info", &message).await?;
    }
    if channel.new_map() {
        let map = channel.map();
        info!("map received: {}", map.0);
    }
    Ok(())
}

fn encode_signed(value: f64) -> u16 {
    (value.clamp(-VALUE_OFFSET, VALUE_OFFSET) + VALUE_OFFSET) as u16
}

fn drive_frame(throttle: f64, steering: f64) -> [MessagePair; 2] {
    [
        MessagePair::new(NAME_THROTTLE, encode_signed(throttle)),
        MessagePair::new(NAME_STEERING, encode_signed(steering)),
    ]
}

/// Zero drive command. Any frame still pending is read out first so the
/// stop is never dropped.
fn halt(master: &mut SimulatedMaster<'_>) {
    match master.pack_after_drain(&drive_frame(0.0, 0.0)) {
        Ok(Some(_)) => debug!("pending drive frame flushed before stop"),
        Ok(None) => {}
        Err(e) => error!("stop frame rejected: {}", e),
    }
}

fn send_drive(throttle: f64, steering: f64) {
    let batch = drive_frame(throttle, steering);
    match BUS.pack(&batch) {
        Ok(()) => debug!("drive frame queued: throttle {} steering {}", throttle, steering),
        Err(nb::Error::WouldBlock) => debug!("previous drive frame not read yet, dropping update"),
        Err(nb::Error::Other(e)) => warn!("drive frame rejected: {}", e),
    }
}

fn drain_bus(master: &mut SimulatedMaster<'_>, reported: &mut Diagnostics) {
    if let Some(batch) = master.read_frame() {
        for pair in &batch {
            debug!("motor bus <- {:#06x} = {}", pair.name, pair.value);
        }
    }
    if BUS.has_new_data() {
        for pair in &BUS.unpack_pairs() {
            info!("motor bus -> {:#06x} = {}", pair.name, pair.value);
        }
    }
    let diagnostics = BUS.diagnostics();
    if diagnostics != *reported {
        warn!("bus diagnostics changed: {:#04x}", diagnostics.bits());
        *reported = diagnostics;
    }
}
