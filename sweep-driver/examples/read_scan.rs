use clap::{Arg, ArgAction, Command};
use std::io::Write;
use std::net::TcpListener;
use std::sync::Arc;
use sweep_driver::{run_driver, DriverConfig, SharedPose};

struct Args {
    port_name: String,
    sweep_rate: u8,
    capture_reference: bool,
}

fn get_args() -> Args {
    let matches = Command::new("Sweep scan server.")
        .about("Reads scans from a Scanse Sweep and serves them as JSON on port 1500.")
        .disable_version_flag(true)
        .arg(
            Arg::new("port")
                .help("The device path to a serial port")
                .use_value_delimiter(false)
                .required(true),
        )
        .arg(
            Arg::new("rate")
                .long("rate")
                .help("Revolutions per second, 1 to 5")
                .value_parser(clap::value_parser!(u8))
                .default_value("2"),
        )
        .arg(
            Arg::new("capture")
                .long("capture")
                .help("Learn the ignore mask from the first revolution")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    Args {
        port_name: matches.get_one::<String>("port").unwrap().to_string(),
        sweep_rate: *matches.get_one::<u8>("rate").unwrap(),
        capture_reference: matches.get_flag("capture"),
    }
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = get_args();

    let listener = TcpListener::bind("0.0.0.0:1500").unwrap();
    let (mut socket, _) = listener.accept().unwrap();

    let config = DriverConfig {
        sweep_rate: args.sweep_rate,
        ..DriverConfig::default()
    };
    // The robot stands still, so the pose never changes.
    let pose = Arc::new(SharedPose::default());
    let driver = run_driver(&args.port_name, config, pose).unwrap();
    if args.capture_reference {
        driver.capture_reference().unwrap();
    }

    let mut last_id = 0;
    loop {
        std::thread::sleep(std::time::Duration::from_millis(50));
        if let Some(e) = driver.last_error() {
            eprintln!("{e}");
            break;
        }
        if driver.state().is_configuring() {
            continue;
        }
        let scan = driver.snapshot();
        if scan.id == last_id {
            continue;
        }
        last_id = scan.id;

        let mut data = serde_json::to_vec(&scan).unwrap();
        data.push(b'\n');
        if socket.write_all(&data).is_err() {
            break;
        }
    }

    drop(driver);
}
