//! Monitor session: memory, I/O routing and the command table in one
//! context object.
//!
//! Commands are single letters followed by hex arguments. Built-in commands
//! are matched first, then extensions in the order they were registered;
//! the first match wins. A failing command reports its error on the
//! console and the session carries on.

use std::sync::Arc;

use log::{debug, warn};

use crate::config::MonitorConfig;
use crate::disk::{ClockRecord, DiskClient};
use crate::error::{XkimError, XkimResult};
use crate::file_io::FileMode;
use crate::hex::{hex_digit_value, load_from_stream, save_to_stream, LoadSummary, MemoryBus};
use crate::link::ParallelPort;
use crate::stream::{Console, IoContext};

/// High byte the auto-run register holds while no program has armed it.
pub const AUTORUN_SENTINEL: u8 = 0xFF;

/// 64 KiB address space of the host computer.
pub struct Memory {
    bytes: Vec<u8>,
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            bytes: vec![0; 0x10000],
        }
    }
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy data into memory starting at `addr`, wrapping at the top.
    pub fn load_at(&mut self, addr: u16, data: &[u8]) {
        let mut a = addr;
        for &b in data {
            self.bytes[a as usize] = b;
            a = a.wrapping_add(1);
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl MemoryBus for Memory {
    fn read(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.bytes[addr as usize] = value;
    }
}

/// Where a load reads from or a save writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Console,
    File(String),
}

impl Endpoint {
    /// Console when no filename is given.
    fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            Some(name) => Endpoint::File(name.to_string()),
            None => Endpoint::Console,
        }
    }
}

/// Result of a successful HEX load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub summary: LoadSummary,
    /// Address the loaded program asked to be started at.
    pub autorun: Option<u16>,
}

/// What the session should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    /// Transfer control to this address.
    Jump(u16),
    Quit,
}

/// Why `Monitor::run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Quit,
    InputClosed,
    Jump(u16),
}

/// A command added to the monitor at run time.
pub trait CommandHandler<C: Console, P: ParallelPort>: Send + Sync {
    /// One help line, shown by `?`.
    fn help(&self) -> &str;

    fn invoke(&self, monitor: &mut Monitor<C, P>, args: &str) -> XkimResult<CommandOutcome>;
}

const BUILTINS: &[(u8, &str)] = &[
    (b'?', "?                   list commands"),
    (b'D', "D                   SD card directory"),
    (b'L', "L [file]            load Intel HEX (console or file)"),
    (b'M', "M start [end]       dump memory"),
    (b'P', "P                   ping the SD card"),
    (b'Q', "Q                   quit"),
    (b'S', "S start end [file]  save Intel HEX (console or file)"),
    (b'T', "T                   SD card clock"),
];

/// The monitor session.
pub struct Monitor<C: Console, P: ParallelPort> {
    memory: Memory,
    io: IoContext<C, DiskClient<P>>,
    config: MonitorConfig,
    extensions: Vec<(u8, Arc<dyn CommandHandler<C, P>>)>,
}

impl<C: Console, P: ParallelPort> Monitor<C, P> {
    pub fn new(console: C, disk: DiskClient<P>, config: MonitorConfig) -> Self {
        Self {
            memory: Memory::new(),
            io: IoContext::new(console, disk),
            config,
            extensions: Vec::new(),
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn io(&self) -> &IoContext<C, DiskClient<P>> {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IoContext<C, DiskClient<P>> {
        &mut self.io
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    fn disk(&mut self) -> &mut DiskClient<P> {
        self.io.file_mut().device_mut()
    }

    /// Add an extension command. Built-ins with the same key still win.
    ///
    /// Keys are single ASCII characters, matched without regard to case.
    pub fn register(
        &mut self,
        key: char,
        handler: impl CommandHandler<C, P> + 'static,
    ) -> XkimResult<()> {
        if !key.is_ascii() || key.is_ascii_whitespace() {
            return Err(XkimError::BadArgument(format!("command key {:?}", key)));
        }
        let handler: Arc<dyn CommandHandler<C, P>> = Arc::new(handler);
        self.extensions.push((key.to_ascii_uppercase() as u8, handler));
        Ok(())
    }

    /// Write text to the console.
    pub fn print(&mut self, text: &str) {
        self.io.console_mut().write_str(text);
    }

    /// Re-enter after a reset: link back to write mode, no open file, console
    /// selected.
    pub fn warm_start(&mut self) {
        self.io.file_mut().abandon();
        self.io.select_console();
        debug!("[MON] warm start");
    }

    pub fn ping(&mut self) -> XkimResult<()> {
        self.disk().ping()
    }

    pub fn clock(&mut self) -> XkimResult<ClockRecord> {
        self.disk().get_clock()
    }

    pub fn directory(&mut self) -> XkimResult<Vec<String>> {
        self.disk().list_directory()
    }

    /// Load Intel HEX into memory.
    ///
    /// The auto-run register is disarmed first; if the loaded data arms it,
    /// the report carries the requested start address. Console I/O is
    /// selected again on return, whatever the outcome.
    pub fn load_hex(&mut self, source: &Endpoint) -> XkimResult<LoadReport> {
        let vector = self.config.autorun_vector;
        self.memory.write(vector.wrapping_add(1), AUTORUN_SENTINEL);

        if let Endpoint::File(name) = source {
            self.io.file_mut().open_for_read(name)?;
            self.io.select_file();
        }
        let loaded = load_from_stream(&mut self.io, &mut self.memory);
        let closed = match source {
            Endpoint::File(_) => self.io.file_mut().close(),
            Endpoint::Console => Ok(()),
        };
        self.io.select_console();
        let summary = loaded?;
        closed?;

        let lo = self.memory.read(vector);
        let hi = self.memory.read(vector.wrapping_add(1));
        let autorun = (hi != AUTORUN_SENTINEL).then(|| u16::from_le_bytes([lo, hi]));
        Ok(LoadReport { summary, autorun })
    }

    /// Save `start..=end` as Intel HEX. Returns the number of data records.
    pub fn save_hex(&mut self, start: u16, end: u16, sink: &Endpoint) -> XkimResult<usize> {
        if let Endpoint::File(name) = sink {
            self.io.file_mut().open_for_write(name)?;
            self.io.select_file();
        }
        let saved = save_to_stream(&mut self.io, &self.memory, start, end);
        let closed = match sink {
            Endpoint::File(_) => self.io.file_mut().close_output(),
            Endpoint::Console => Ok(()),
        };
        self.io.select_console();
        let records = saved?;
        closed?;
        Ok(records)
    }

    /// Run one command line, reporting any failure on the console.
    pub fn execute(&mut self, line: &str) -> CommandOutcome {
        match self.dispatch(line) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("[MON] {:?} failed: {}", line.trim(), e);
                self.recover();
                self.print(&format!("\r\nError: {}\r\n", e));
                CommandOutcome::Continue
            }
        }
    }

    /// Drop any half-finished file session and talk to the console again.
    fn recover(&mut self) {
        if self.io.file().mode() != FileMode::Closed {
            if let Err(e) = self.io.file_mut().close() {
                warn!("[MON] close during recovery failed: {}", e);
            }
        }
        self.io.select_console();
    }

    /// Run one command line.
    pub fn dispatch(&mut self, line: &str) -> XkimResult<CommandOutcome> {
        let line = line.trim();
        let Some(first) = line.chars().next() else {
            return Ok(CommandOutcome::Continue);
        };
        if !first.is_ascii() {
            return Err(XkimError::BadArgument(format!("unknown command {}", first)));
        }
        let key = first.to_ascii_uppercase() as u8;
        let args = line[first.len_utf8()..].trim();

        if BUILTINS.iter().any(|(k, _)| *k == key) {
            return self.builtin(key, args);
        }
        let handler = self
            .extensions
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, h)| Arc::clone(h));
        match handler {
            Some(handler) => handler.invoke(self, args),
            None => Err(XkimError::BadArgument(format!("unknown command {}", first))),
        }
    }

    fn builtin(&mut self, key: u8, args: &str) -> XkimResult<CommandOutcome> {
        let mut words = args.split_whitespace();
        match key {
            b'?' => self.help(),
            b'D' => {
                for name in self.directory()? {
                    self.print(&format!("{}\r\n", name));
                }
            }
            b'L' => {
                let source = Endpoint::from_arg(words.next());
                let report = self.load_hex(&source)?;
                self.print(&format!("\r\nLoaded {} bytes\r\n", report.summary.bytes));
                if let Some(addr) = report.autorun {
                    self.print(&format!("Auto-run at {:04X}\r\n", addr));
                    return Ok(CommandOutcome::Jump(addr));
                }
            }
            b'M' => {
                let start = parse_address(words.next())?;
                let end = match words.next() {
                    Some(word) => parse_address(Some(word))?,
                    None => start.saturating_add(0x0F),
                };
                self.dump(start, end);
            }
            b'P' => {
                self.ping()?;
                self.print("SD card OK\r\n");
            }
            b'Q' => return Ok(CommandOutcome::Quit),
            b'S' => {
                let start = parse_address(words.next())?;
                let end = parse_address(words.next())?;
                let sink = Endpoint::from_arg(words.next());
                self.save_hex(start, end, &sink)?;
            }
            b'T' => {
                let clock = self.clock()?;
                self.print(&format!("{}\r\n", clock));
            }
            _ => {}
        }
        Ok(CommandOutcome::Continue)
    }

    fn help(&mut self) {
        let mut text = String::new();
        for (_, line) in BUILTINS {
            text.push_str(line);
            text.push_str("\r\n");
        }
        for (_, handler) in &self.extensions {
            text.push_str(handler.help());
            text.push_str("\r\n");
        }
        self.print(&text);
    }

    /// Hex dump, 16 bytes per line.
    fn dump(&mut self, start: u16, end: u16) {
        let mut text = String::new();
        let mut addr = start as u32;
        while addr <= end as u32 {
            let last = (addr + 15).min(end as u32);
            text.push_str(&format!("{:04X}:", addr));
            for a in addr..=last {
                text.push_str(&format!(" {:02X}", self.memory.read(a as u16)));
            }
            text.push_str("\r\n");
            addr = last + 1;
        }
        self.print(&text);
    }

    /// Read one line from the console, echoing it. `None` once input is
    /// closed and nothing was typed.
    pub fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        loop {
            let Some(ch) = self.io.console_mut().wait_for_key() else {
                return (!line.is_empty()).then_some(line);
            };
            match ch {
                b'\r' | b'\n' => return Some(line),
                0x08 | 0x7F => {
                    if line.pop().is_some() {
                        self.print("\x08 \x08");
                    }
                }
                _ => {
                    self.io.console_mut().write(ch);
                    line.push(ch as char);
                }
            }
        }
    }

    /// Prompt, read and execute commands until one ends the session.
    pub fn run(&mut self) -> ExitReason {
        loop {
            self.print("\r\n>");
            let Some(line) = self.read_line() else {
                return ExitReason::InputClosed;
            };
            match self.execute(&line) {
                CommandOutcome::Continue => {}
                CommandOutcome::Jump(addr) => return ExitReason::Jump(addr),
                CommandOutcome::Quit => return ExitReason::Quit,
            }
        }
    }
}

/// Parse a 1-4 digit hex address argument.
pub fn parse_address(arg: Option<&str>) -> XkimResult<u16> {
    let text = arg.ok_or_else(|| XkimError::BadArgument("missing address".into()))?;
    if text.is_empty() || text.len() > 4 {
        return Err(XkimError::BadArgument(text.to_string()));
    }
    text.bytes()
        .try_fold(0u16, |acc, ch| {
            hex_digit_value(ch).map(|d| (acc << 4) | d as u16)
        })
        .ok_or_else(|| XkimError::BadArgument(text.to_string()))
}
