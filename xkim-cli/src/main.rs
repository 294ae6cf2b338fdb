//! xkim - Interactive monitor session against a simulated SD card.
//!
//! Usage:
//!   xkim [card-directory] [--config FILE] [--timeout-ms N] [--trace]
//!
//! Examples:
//!   xkim sdcard/                     # Serve sdcard/ as the SD card
//!   xkim --config xkim.json          # Take the card directory from config
//!   xkim sdcard/ --trace             # Log link and disk traffic to stderr

use std::cell::Cell;
use std::io::Write;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use log::{LevelFilter, Metadata, Record};
use tokio::sync::mpsc as tokio_mpsc;

use xkim_core::{simulated_disk, Console, DirectoryCard, ExitReason, Monitor, MonitorConfig};

const CTRL_C: u8 = 0x03;

/// Extended KIM-1 monitor CLI
#[derive(Parser, Debug)]
#[command(name = "xkim")]
#[command(about = "Run the monitor against a host directory posing as the SD card")]
struct Args {
    /// Directory served as the SD card (overrides the config file)
    card: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, default_value = "xkim.json")]
    config: PathBuf,

    /// Link handshake timeout in milliseconds (default: wait forever)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Enable link and disk tracing on stderr
    #[arg(short, long)]
    trace: bool,
}

/// Stderr logger, usable while the terminal is in raw mode.
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprint!("{:5} {}\r\n", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Route all log levels to stderr. Fails if a logger is already set.
fn install_logger() -> Result<(), String> {
    log::set_logger(&LOGGER).map_err(|e| e.to_string())?;
    log::set_max_level(LevelFilter::Trace);
    Ok(())
}

/// Console fed by the terminal reader task over a channel.
struct ChannelConsole {
    key_rx: mpsc::Receiver<u8>,
    /// Key pulled off the channel by `has_key` but not yet taken
    pending: Cell<Option<u8>>,
}

impl ChannelConsole {
    fn new(key_rx: mpsc::Receiver<u8>) -> Self {
        Self {
            key_rx,
            pending: Cell::new(None),
        }
    }
}

impl Console for ChannelConsole {
    fn write(&mut self, ch: u8) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        let _ = handle.write_all(&[ch]);
        let _ = handle.flush();
    }

    fn has_key(&self) -> bool {
        if self.pending.get().is_some() {
            return true;
        }
        match self.key_rx.try_recv() {
            Ok(ch) => {
                self.pending.set(Some(ch));
                true
            }
            Err(_) => false,
        }
    }

    fn get_key(&mut self) -> Option<u8> {
        if let Some(ch) = self.pending.take() {
            return Some(ch);
        }
        self.key_rx.try_recv().ok()
    }

    fn wait_for_key(&mut self) -> Option<u8> {
        if let Some(ch) = self.pending.take() {
            return Some(ch);
        }
        // Channel closed means the reader quit.
        self.key_rx.recv().ok()
    }
}

/// Translate crossterm key events to ASCII.
fn translate_key(code: KeyCode, modifiers: KeyModifiers) -> Option<u8> {
    if modifiers.contains(KeyModifiers::CONTROL) {
        if let KeyCode::Char(c) = code {
            let upper = c.to_ascii_uppercase();
            if upper.is_ascii_uppercase() {
                return Some(upper as u8 - 64);
            }
        }
    }

    match code {
        KeyCode::Char(c) if c.is_ascii() => Some(c as u8),
        KeyCode::Enter => Some(b'\r'),
        KeyCode::Backspace => Some(0x08),
        KeyCode::Tab => Some(b'\t'),
        KeyCode::Esc => Some(0x1B),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.trace {
        install_logger()?;
    }

    let mut config = MonitorConfig::load_from_path(&args.config)?;
    if let Some(ms) = args.timeout_ms {
        config.link_timeout_ms = Some(ms);
    }
    let root = args
        .card
        .or_else(|| config.card_directory.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    if !root.is_dir() {
        eprintln!("Card directory {} not found", root.display());
        return Err(format!("not a directory: {}", root.display()).into());
    }
    eprintln!("SD card: {}", root.display());

    let disk = simulated_disk(DirectoryCard::new(root), config.link_config());

    // Create channel for keyboard input
    let (key_tx, key_rx) = mpsc::channel::<u8>();

    // Create shutdown signal
    let (shutdown_tx, mut shutdown_rx) = tokio_mpsc::channel::<()>(1);

    let console = ChannelConsole::new(key_rx);

    // Enable raw mode (gracefully handle non-TTY)
    let raw_mode_enabled = enable_raw_mode().is_ok();

    let monitor_handle = tokio::task::spawn_blocking(move || {
        let mut monitor = Monitor::new(console, disk, config);
        monitor.print("xkim monitor, ? for help\r\n");
        monitor.run()
    });

    // Spawn terminal input reader
    let input_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    break;
                }
                _ = tokio::time::sleep(Duration::from_millis(10)) => {
                    if event::poll(Duration::from_millis(0)).unwrap_or(false) {
                        if let Ok(Event::Key(key_event)) = event::read() {
                            match translate_key(key_event.code, key_event.modifiers) {
                                // Dropping the sender closes the console input.
                                Some(CTRL_C) => break,
                                Some(ch) => {
                                    if key_tx.send(ch).is_err() {
                                        break;
                                    }
                                }
                                None => {}
                            }
                        }
                    }
                }
            }
        }
    });

    let reason = monitor_handle.await?;

    // Signal input handler to stop
    let _ = shutdown_tx.send(()).await;
    let _ = input_handle.await;

    if raw_mode_enabled {
        let _ = disable_raw_mode();
    }

    match reason {
        ExitReason::Jump(addr) => {
            eprintln!("\nProgram requested start at ${:04X} (no CPU attached)", addr);
        }
        ExitReason::Quit | ExitReason::InputClosed => eprintln!(),
    }

    Ok(())
}
