#![deny(clippy::unwrap_used)]

use btleplug::api::BDAddr;
use clap::{arg, command, value_parser};
use log::LevelFilter;
use std::process::exit;
use std::time::Duration;

use gw121ctrl::proto::conv::pretty_ts;
use gw121ctrl::proto::{ProtoError, Result};
use gw121ctrl::{device, ConnectOptions, ConnectTarget, Device, Reading, DEFAULT_DEVICE_NAME};

fn parse_address(s: &str) -> std::result::Result<BDAddr, String> {
    s.parse::<BDAddr>()
        .map_err(|err| format!("Invalid Bluetooth address '{}': {}", s, err))
}

#[tokio::main]
async fn main() {
    let matches = command!() // requires `cargo` feature
        .arg(
            arg!(
                -n --name <NAME> "Advertised name of the multimeter"
            )
            .default_value(DEFAULT_DEVICE_NAME)
            .required(false),
        )
        .arg(
            arg!(
                -a --address <ADDRESS> "Bluetooth address of the multimeter, overrides --name"
            )
            .required(false)
            .value_parser(parse_address),
        )
        .arg(
            arg!(
                -s --scan <SECONDS> "Scan duration"
            )
            .default_value("5")
            .value_parser(value_parser!(u64)),
        )
        .arg(
            arg!(
                -t --timeout <SECONDS> "Wait time for a reading"
            )
            .default_value("2")
            .value_parser(value_parser!(u64)),
        )
        .arg(arg!(
            -d --debug ... "Turn debugging information on"
        ))
        .subcommand(clap::Command::new("scan").about("List Bluetooth devices in range"))
        .subcommand(clap::Command::new("read").about("Print a single reading"))
        .subcommand(
            clap::Command::new("poll")
                .about("Print readings continuously")
                .arg(
                    arg!(-c --count <N> "Stop after N readings")
                        .required(false)
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand_required(true)
        .get_matches();

    let level = match matches.get_count("debug") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    if let Err(e) = handle_args(&matches).await {
        match e {
            ProtoError::NoAdapter => {
                eprintln!("No Bluetooth adapter found, is Bluetooth enabled?");
            }
            ProtoError::DeviceNotFound(target) => {
                eprintln!("Device {} not found, is Bluetooth enabled on the meter?", target);
            }
            ProtoError::ConnectFailed(msg) => {
                eprintln!("Failed to connect to {}", msg);
            }
            ProtoError::CharacteristicNotFound => {
                eprintln!("Device does not provide the 121GW measurement service, aborting!");
            }
            ProtoError::Ble(err) => {
                eprintln!("Bluetooth error: {}", err);
            }
            ProtoError::Io(err) => {
                eprintln!("I/O Error: {}", err);
            }
            ProtoError::ReadTimeout(timeout) => {
                eprintln!("No reading received within {:?}", timeout);
            }
            ProtoError::Abort => {
                eprintln!("Connection to device was lost, aborting!");
            }
        }
        exit(-1);
    }
}

fn connect_options(matches: &clap::ArgMatches) -> ConnectOptions {
    let target = match matches.get_one::<BDAddr>("address") {
        Some(addr) => ConnectTarget::Address(*addr),
        None => ConnectTarget::Name(
            matches
                .get_one::<String>("name")
                .cloned()
                .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string()),
        ),
    };
    let mut options = ConnectOptions {
        target,
        ..Default::default()
    };
    if let Some(secs) = matches.get_one::<u64>("scan") {
        options.scan_duration = Duration::from_secs(*secs);
    }
    if let Some(secs) = matches.get_one::<u64>("timeout") {
        options.read_timeout = Duration::from_secs(*secs);
    }
    options
}

fn print_reading(reading: &Reading) {
    println!(
        "{}  {:<18} {}",
        pretty_ts(&reading.ts),
        reading.label,
        reading
    );
}

async fn poll(device: &mut Device, count: Option<u64>) -> Result<()> {
    let mut received = 0_u64;
    while count.map_or(true, |n| received < n) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            result = device.reading() => match result {
                Ok(reading) => {
                    print_reading(&reading);
                    received += 1;
                }
                // meter may pause, e.g. while switching modes
                Err(ProtoError::ReadTimeout(timeout)) => {
                    eprintln!("No reading within {:?}", timeout);
                }
                Err(err) => return Err(err),
            },
        }
    }
    Ok(())
}

async fn handle_args(matches: &clap::ArgMatches) -> Result<()> {
    let options = connect_options(matches);

    match matches.subcommand() {
        Some(("scan", _args)) => {
            eprintln!("Scanning for {:?}...\n", options.scan_duration);
            for dev in device::scan(options.scan_duration).await? {
                println!("{}", dev);
            }
        }
        Some(("read", _args)) => {
            let mut device = Device::connect(&options).await?;
            eprintln!("Connected to: {}\n", options.target);
            let result = device.reading().await;
            device.close().await?;
            print_reading(&result?);
        }
        Some(("poll", args)) => {
            let count = args.get_one::<u64>("count").copied();
            let mut device = Device::connect(&options).await?;
            eprintln!("Connected to: {}\n", options.target);

            let result = poll(&mut device, count).await;
            let closed = device.close().await;
            result?;
            closed?;
        }
        _ => {
            unreachable!("subcommand required")
        }
    }

    Ok(())
}
