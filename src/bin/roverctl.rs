use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "2526";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let number = |v: String| match v.parse::<f64>() {
        Ok(_) => Ok(()),
        Err(_) => Err(format!("'{}' is not a number", v)),
    };

    let matches = App::new("roverctl")
        .version("0.1.0")
        .about("Send instructions to the vehicle")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .setting(AppSettings::AllowLeadingHyphen)
        .arg(
            Arg::with_name("host")
                .short("h")
                .long("host")
                .value_name("HOST")
                .help("Vehicle host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Vehicle instruction port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("wait")
                .short("w")
                .long("wait")
                .value_name("MS")
                .help("How long to wait for responses")
                .takes_value(true)
                .default_value("500")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("manual")
                .about("Drive with explicit throttle and steering")
                .arg(Arg::with_name("throttle").required(true).validator(number))
                .arg(Arg::with_name("steering").required(true).validator(number)),
        )
        .subcommand(
            SubCommand::with_name("semi")
                .about("Send a semi-autonomous direction instruction")
                .arg(Arg::with_name("direction").required(true))
                .arg(Arg::with_name("id").required(true)),
        )
        .subcommand(
            SubCommand::with_name("params")
                .about("Update controller parameters")
                .args(
                    &["steering-kp", "steering-kd", "speed-kp", "speed-ki", "turn-kd", "angle-offset"]
                        .iter()
                        .map(|&name| {
                            Arg::with_name(name)
                                .long(name)
                                .takes_value(true)
                                .default_value("0")
                                .validator(number)
                        })
                        .collect::<Vec<_>>(),
                ),
        )
        .subcommand(
            SubCommand::with_name("mission")
                .about("Send a drive mission")
                .arg(Arg::with_name("id").required(true))
                .arg(
                    Arg::with_name("waypoint")
                        .help("Waypoints as x,y")
                        .multiple(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("map")
                .about("Send map data")
                .arg(Arg::with_name("json").help("Map body as JSON").required(true)),
        )
        .subcommand(
            SubCommand::with_name("raw")
                .about("Send a raw line")
                .arg(Arg::with_name("line").required(true)),
        )
        .subcommand(SubCommand::with_name("stop").about("Emergency stop"))
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse::<u16>()?;
    let wait = Duration::from_millis(matches.value_of("wait").unwrap_or("500").parse::<u64>()?);

    let line = match matches.subcommand() {
        ("manual", Some(sub)) => manual_line(sub)?,
        ("semi", Some(sub)) => semi_line(sub)?,
        ("params", Some(sub)) => params_line(sub)?,
        ("mission", Some(sub)) => mission_line(sub)?,
        ("map", Some(sub)) => {
            let body: serde_json::Value = serde_json::from_str(sub.value_of("json").unwrap_or("{}"))?;
            json!({ "MapData": body }).to_string()
        }
        ("raw", Some(sub)) => sub.value_of("line").unwrap_or_default().to_string(),
        ("stop", _) => "STOP".to_string(),
        _ => unreachable!("clap requires a subcommand"),
    };

    send_line(host, port, &line, wait).await
}

fn value(sub: &ArgMatches<'_>, name: &str) -> Result<f64, Box<dyn std::error::Error>> {
    Ok(sub.value_of(name).unwrap_or("0").parse::<f64>()?)
}

fn manual_line(sub: &ArgMatches<'_>) -> Result<String, Box<dyn std::error::Error>> {
    Ok(json!({
        "ManualDriveInstruction": {
            "throttle": value(sub, "throttle")?,
            "steering": value(sub, "steering")?,
        }
    })
    .to_string())
}

fn semi_line(sub: &ArgMatches<'_>) -> Result<String, Box<dyn std::error::Error>> {
    let direction = sub.value_of("direction").unwrap_or("0").parse::<i32>()?;
    Ok(json!({
        "SemiDriveInstruction": {
            "direction": direction,
            "id": sub.value_of("id").unwrap_or_default(),
        }
    })
    .to_string())
}

fn params_line(sub: &ArgMatches<'_>) -> Result<String, Box<dyn std::error::Error>> {
    Ok(json!({
        "ParameterConfiguration": {
            "steering_kp": value(sub, "steering-kp")?,
            "steering_kd": value(sub, "steering-kd")?,
            "speed_kp": value(sub, "speed-kp")?,
            "speed_ki": value(sub, "speed-ki")?,
            "turn_kd": value(sub, "turn-kd")?,
            "angle_offset": value(sub, "angle-offset")?,
        }
    })
    .to_string())
}

fn mission_line(sub: &ArgMatches<'_>) -> Result<String, Box<dyn std::error::Error>> {
    let mut waypoints = Vec::new();
    for point in sub.values_of("waypoint").into_iter().flatten() {
        let (x, y) = point
            .split_once(',')
            .ok_or_else(|| format!("waypoint '{}' is not x,y", point))?;
        waypoints.push(json!({ "x": x.trim().parse::<f64>()?, "y": y.trim().parse::<f64>()? }));
    }
    Ok(json!({
        "DriveMission": {
            "id": sub.value_of("id").unwrap_or_default(),
            "waypoints": waypoints,
        }
    })
    .to_string())
}

async fn send_line(host: &str, port: u16, line: &str, wait: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", host, port);
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("{} Failed to connect to vehicle at {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Is the vehicle running? Start it with:", "💡".yellow());
                eprintln!("   {}", "cargo run --bin roverlink-vehicle".bright_cyan());
            }
            return Err(e.into());
        }
    };

    let (reader, mut writer) = stream.into_split();
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    println!("{} {}", "📤".bright_blue(), line.dimmed());

    let mut lines = BufReader::new(reader).lines();
    loop {
        match tokio::time::timeout(wait, lines.next_line()).await {
            Ok(Ok(Some(response))) => println!("{} {}", "📨".green(), response.bright_green()),
            Ok(Ok(None)) => {
                println!("{}", "Vehicle closed the connection".yellow());
                break;
            }
            Ok(Err(e)) => {
                eprintln!("{} {}", "❌".red(), e.to_string().bright_red());
                break;
            }
            Err(_) => break,
        }
    }
    Ok(())
}
