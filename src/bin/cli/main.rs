//! Boardlink command line interface.

mod keyboard;

use std::{
    io::{self, BufRead, Write},
    process,
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_t, App, AppSettings::*, Arg,
    ArgMatches,
};
use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Select};
use hexplay::HexViewBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, log_enabled, trace, Level::Debug, LevelFilter};
use simplelog::*;

use boardlink::{
    self as bl, BoardProfile, ConfigBuilder, Connection, ConnectionConfig, DataBits,
    FirmwareSource, Parity, PolicyBuilder, StopBits, TransportPolicy, UploadCallback, UploadError,
    WifiParams,
};

use keyboard::poll_escape;

fn main() {
    println!("[BL] boardlink v{}", crate_version!());

    ctrlc::set_handler(move || {
        println!("🛑 received Ctrl+C!");
        process::exit(0);
    })
    .expect("Failed to install my Ctrl-C handler!");

    let matches = App::new(crate_name!())
        .version(format!("v{}", crate_version!()).as_str())
        .author(crate_authors!())
        .about(crate_description!())
        .long_about(
            "\n\
            Boardlink finds the board to talk to over USB, then WiFi, then \
            Bluetooth, in that order and as enabled by the options.\n\
            \n\
            Given a firmware image, it pushes it to the board's bootloader:\n\
               \t* switches to the board's bootloader baud rate \n\
               \t* resets the board if the board needs it \n\
               \t* sends the image size as 4 bytes, lowest order first \n\
               \t* waits for 'OK' \n\
               \t* sends the image \n\
            \n\
            Press `Esc` during the upload to cancel it.\n\
            \n\
            Without a firmware image, it goes into a simple terminal mode. Any \
            input it gets from stdin is passed to the board, and any data it \
            gets from the board is printed to stdout.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .arg(
            Arg::with_name("NO_USB")
                .help("do not look for USB serial adapters")
                .long("--no-usb"),
        )
        .arg(
            Arg::with_name("WIFI")
                .help("also try a WiFi serial bridge")
                .long_help(
                    "also try a WiFi serial bridge, at HOST when given or at \
                     the default bridge address otherwise",
                )
                .long("--wifi")
                .value_name("HOST")
                .takes_value(true)
                .min_values(0)
                .require_equals(true),
        )
        .arg(
            Arg::with_name("DATA_PORT")
                .help("TCP port of the WiFi bridge data stream")
                .long("--data-port")
                .takes_value(true)
                .require_equals(true)
                .requires("WIFI"),
        )
        .arg(
            Arg::with_name("CONTROL_PORT")
                .help("TCP port of the WiFi bridge control stream")
                .long("--control-port")
                .takes_value(true)
                .require_equals(true)
                .requires("WIFI"),
        )
        .arg(
            Arg::with_name("BLUETOOTH")
                .help("also try a Bluetooth serial port")
                .long_help(
                    "also try a Bluetooth serial port, the one whose name \
                     contains NAME when given or the first one otherwise",
                )
                .long("--bluetooth")
                .value_name("NAME")
                .takes_value(true)
                .min_values(0)
                .require_equals(true),
        )
        .arg(
            Arg::with_name("BAUD_RATE")
                .help("serial line baud rate")
                .short("-b")
                .long("--baud-rate")
                .takes_value(true)
                .default_value("9600")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("DATA_BITS")
                .help("number of bits per character")
                .short("-d")
                .long("--data-bits")
                .takes_value(true)
                .possible_values(&["5", "6", "7", "8"])
                .default_value("8")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("STOP_BITS")
                .help("number of stop bits per byte")
                .short("-s")
                .long("--stop-bits")
                .takes_value(true)
                .possible_values(&["1", "2"])
                .default_value("1")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("PARITY")
                .help("parity checking protocol")
                .short("-p")
                .long("--parity")
                .takes_value(true)
                .possible_values(&["none", "odd", "even"])
                .default_value("none")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("BOARD")
                .help("board profile used for the upload")
                .long_help(
                    "board profile used for the upload; when not set and a \
                     firmware image is given, the board is selected \
                     interactively.",
                )
                .long("--board")
                .takes_value(true)
                .possible_values(&board_names())
                .require_equals(true),
        )
        .arg(
            Arg::with_name("FIRMWARE")
                .help("path to the firmware image to be uploaded")
                .index(1),
        )
        .arg(Arg::with_name("v").short("v").multiple(true).help(
            "Sets the logging level of verbosity, repeat several times for \
                higher verbosity",
        ))
        .get_matches();

    // Vary the output based on how many times the user used the "verbose" flag
    // (i.e. 'boardlink -v -v -v' or 'boardlink -vvv' vs 'boardlink -v'
    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .unwrap();

    trace!("{:#?}", matches);

    let config = line_config(&matches);
    let policy = transport_policy(&matches);
    debug!("{:?}", policy);

    let connection = Arc::new(Connection::new(policy));

    let exit_code = match matches.value_of("FIRMWARE") {
        Some(path) => {
            let board = match matches.value_of("BOARD") {
                Some(name) => bl::board_by_name(name).copied(),
                None => select_board_interactive(),
            };
            match board {
                Some(board) => upload(&connection, board, path),
                None => {
                    println!("[BL] ❌ no board selected");
                    1
                }
            }
        }
        None => terminal(connection, &config),
    };
    debug!("exit code: {}", exit_code);
    process::exit(exit_code);
}

// =============================================================================
// Arguments
// =============================================================================

fn board_names() -> Vec<&'static str> {
    bl::boards().iter().map(|b| b.name).collect()
}

fn line_config(matches: &ArgMatches) -> ConnectionConfig {
    // It's safe to call unwrap on all command line arguments with default
    // values, because the value with either be what the user input at runtime
    // or the default value

    let baud_rate = value_t!(matches.value_of("BAUD_RATE"), u32).unwrap_or_else(|_| {
        invalid_value("baud-rate", matches.value_of("BAUD_RATE").unwrap());
    });

    let data_bits = match matches.value_of("DATA_BITS").unwrap() {
        "5" => DataBits::Five,
        "6" => DataBits::Six,
        "7" => DataBits::Seven,
        "8" => DataBits::Eight,
        _ => unreachable!(),
    };

    let stop_bits = match matches.value_of("STOP_BITS").unwrap() {
        "1" => StopBits::One,
        "2" => StopBits::Two,
        _ => unreachable!(),
    };

    let parity = match matches.value_of("PARITY").unwrap() {
        "none" => Parity::None,
        "even" => Parity::Even,
        "odd" => Parity::Odd,
        _ => unreachable!(),
    };

    ConfigBuilder::new()
        .baud_rate(baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .finalize()
}

fn transport_policy(matches: &ArgMatches) -> TransportPolicy {
    let mut builder = PolicyBuilder::new().usb(!matches.is_present("NO_USB"));

    if matches.is_present("WIFI") {
        let data_port = port_value(matches, "DATA_PORT", "data-port");
        let control_port = port_value(matches, "CONTROL_PORT", "control-port");
        builder = builder.wifi(WifiParams::new(
            matches.value_of("WIFI"),
            data_port,
            control_port,
        ));
    }

    if matches.is_present("BLUETOOTH") {
        builder = builder.bluetooth(matches.value_of("BLUETOOTH"));
    }

    builder.finalize()
}

/// Value of a port option, 0 (the default port) when absent.
fn port_value(matches: &ArgMatches, name: &str, option: &str) -> u16 {
    match matches.value_of(name) {
        Some(value) => value
            .parse::<u16>()
            .unwrap_or_else(|_| invalid_value(option, value)),
        None => 0,
    }
}

fn invalid_value(option: &str, value: &str) -> ! {
    println!(
        "{}: `{}` needs to be a numeric value",
        style("error").red(),
        style(option).cyan()
    );
    println!(
        "   {} `{}` is not a valid value",
        style("-->").cyan(),
        style(value).on_red()
    );
    process::exit(-1);
}

fn select_board_interactive() -> Option<BoardProfile> {
    let items: Vec<String> = bl::boards()
        .iter()
        .map(|b| format!("{} ({} baud)", b.name, b.baud_rate))
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .items(&items)
        .with_prompt("Select the board to upload to:")
        .default(0)
        .interact_on_opt(&Term::stdout());

    match selection {
        Ok(Some(index)) => Some(bl::boards()[index]),
        Ok(None) => {
            debug!("user did not select any board");
            None
        }
        Err(ref e) => {
            info!("error: {}", e.to_string());
            None
        }
    }
}

// =============================================================================
// Upload
// =============================================================================

/// Drives the progress bar from the upload events.
struct ProgressReport {
    bar: ProgressBar,
    success: Arc<Mutex<bool>>,
}

impl UploadCallback for ProgressReport {
    fn on_pre_upload(&mut self) {
        self.bar.set_message("Pushing");
    }

    fn on_uploading(&mut self, progress: u32) {
        self.bar.set_position(progress.into());
    }

    fn on_post_upload(&mut self, success: bool) {
        *self.success.lock().unwrap() = success;
        if success {
            self.bar
                .finish_with_message(format!("{}", style("👍 Firmware uploaded").green()));
        }
    }

    fn on_cancel(&mut self) {
        self.bar
            .abandon_with_message(format!("{}", style("❌ Upload canceled").yellow()));
    }

    fn on_error(&mut self, error: UploadError) {
        self.bar
            .abandon_with_message(format!("{}", style(format!("🙁 {}", error)).red()));
    }
}

fn upload(connection: &Connection, board: BoardProfile, path: &str) -> i32 {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[BL] ⏩ {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}%")
            .progress_chars("=>-"),
    );
    let success = Arc::new(Mutex::new(false));

    println!(
        "[BL] Uploading `{}` to {} (`{}` to cancel)",
        style(path).cyan(),
        board.name,
        style("Esc").cyan()
    );
    connection.upload(
        board,
        FirmwareSource::path(path),
        Some(Box::new(ProgressReport {
            bar,
            success: success.clone(),
        })),
    );

    while connection.is_uploading() {
        match poll_escape(Duration::from_millis(500)) {
            Ok(true) => connection.cancel_upload(),
            Ok(false) => {}
            Err(e) => {
                info!("error: {}", e);
                thread::sleep(Duration::from_millis(500));
            }
        }
    }
    connection.wait_for_upload();

    let success = *success.lock().unwrap();
    if success {
        0
    } else {
        1
    }
}

// =============================================================================
// Terminal
// =============================================================================

fn terminal(connection: Arc<Connection>, config: &ConnectionConfig) -> i32 {
    if let Err(e) = connection.open_with(config) {
        println!("[BL] 🙁 {}", style(format!("no board found: {}", e)).red());
        return 1;
    }
    println!(
        "[BL] 👍 {} connection via {} ({:04x}:{:04x}) at {} baud",
        style(connection.physical_connection_name()).green(),
        connection.driver_name(),
        connection.vendor_id(),
        connection.product_id(),
        config.baud_rate
    );

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    connection
        .add_read_listener(move |_| {
            let _ = tx.lock().unwrap().send(());
        })
        .unwrap();

    let input = connection.clone();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(mut line) => {
                    line.push('\n');
                    if let Err(e) = input.write(line.as_bytes()) {
                        info!("error: {}", e);
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut buf = [0u8; 1024];
    loop {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return 0,
        }
        loop {
            let n = match connection.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    println!("[BL] 🙁 {}", style(e).red());
                    return 1;
                }
            };
            if log_enabled!(Debug) {
                let view = HexViewBuilder::new(&buf[..n])
                    .address_offset(0)
                    .row_width(16)
                    .finish();
                debug!("received:\n{}", view);
            }
            let mut stdout = io::stdout();
            let _ = stdout.write_all(&buf[..n]);
            let _ = stdout.flush();
        }
        if !connection.is_open() {
            println!("[BL] connection lost");
            return 1;
        }
    }
}
