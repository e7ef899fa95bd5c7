use std::fs::{create_dir_all, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Report output channels, ordered from the most detailed to the most summarized
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogEvent {
    /// Per-step rows of a run (alpha, spend, conversions)
    Step,
    /// Run-level data (campaign profile, summary of a finished run)
    Run,
    /// Comparisons between runs inside a scenario
    Scenario,
    /// Pass/fail lines of scenario checks
    Validation,
}

/// A destination for report text
pub trait LogReceiver {
    fn should_log(&self, event: LogEvent) -> bool;

    fn write(&mut self, s: &str) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;
}

/// Writes to stdout
pub struct ConsoleReceiver {
    events: Vec<LogEvent>,
}

impl ConsoleReceiver {
    pub fn new(events: Vec<LogEvent>) -> Box<dyn LogReceiver> {
        Box::new(Self { events })
    }
}

impl LogReceiver for ConsoleReceiver {
    fn should_log(&self, event: LogEvent) -> bool {
        self.events.contains(&event)
    }

    fn write(&mut self, s: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(s.as_bytes())?;
        out.flush()
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// Writes to a report file, truncated on creation; buffered until flushed or dropped
pub struct FileReceiver {
    out: BufWriter<File>,
    events: Vec<LogEvent>,
}

impl FileReceiver {
    pub fn new(path: &Path, events: Vec<LogEvent>) -> io::Result<Box<dyn LogReceiver>> {
        if let Some(dir) = path.parent() {
            create_dir_all(dir)?;
        }
        let out = BufWriter::new(File::create(path)?);
        Ok(Box::new(Self { out, events }))
    }
}

impl LogReceiver for FileReceiver {
    fn should_log(&self, event: LogEvent) -> bool {
        self.events.contains(&event)
    }

    fn write(&mut self, s: &str) -> io::Result<()> {
        self.out.write_all(s.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl Drop for FileReceiver {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}

pub type ReceiverId = usize;

/// Routes report text to every receiver listening for its event
#[derive(Default)]
pub struct Logger {
    receivers: Vec<(ReceiverId, Box<dyn LogReceiver>)>,
    next_id: ReceiverId,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_receiver(&mut self, receiver: Box<dyn LogReceiver>) -> ReceiverId {
        self.next_id += 1;
        self.receivers.push((self.next_id, receiver));
        self.next_id
    }

    /// Drop a receiver, flushing whatever it still buffers
    pub fn remove_receiver(&mut self, id: ReceiverId) {
        self.receivers.retain(|(receiver_id, _)| *receiver_id != id);
    }

    pub fn log(&mut self, event: LogEvent, message: &str) -> io::Result<()> {
        self.write_where(|receiver| receiver.should_log(event), message)
    }

    pub fn logln(&mut self, event: LogEvent, message: &str) -> io::Result<()> {
        self.log(event, &format!("{}\n", message))
    }

    /// Errors reach every receiver listening at `event` or any more summarized level,
    /// once per receiver
    pub fn errln(&mut self, event: LogEvent, message: &str) -> io::Result<()> {
        self.escalate(event, &format!("ERROR {}\n", message))
    }

    /// Same routing as `errln`
    pub fn warnln(&mut self, event: LogEvent, message: &str) -> io::Result<()> {
        self.escalate(event, &format!("WARNING {}\n", message))
    }

    pub fn flush(&mut self) -> io::Result<()> {
        for (_, receiver) in &mut self.receivers {
            receiver.flush()?;
        }
        Ok(())
    }

    fn escalate(&mut self, event: LogEvent, line: &str) -> io::Result<()> {
        const LEVELS: [LogEvent; 4] = [LogEvent::Step, LogEvent::Run, LogEvent::Scenario, LogEvent::Validation];
        self.write_where(
            |receiver| LEVELS.iter().any(|&level| level >= event && receiver.should_log(level)),
            line,
        )
    }

    fn write_where(&mut self, wants: impl Fn(&dyn LogReceiver) -> bool, text: &str) -> io::Result<()> {
        for (_, receiver) in &mut self.receivers {
            if wants(&**receiver) {
                receiver.write(text)?;
            }
        }
        Ok(())
    }
}

/// Replace characters that are not safe in a file name
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, ' ' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
        .collect()
}

/// `logln!(logger, event, "fmt", args..)`; write errors are ignored
#[macro_export]
macro_rules! logln {
    ($logger:expr, $event:expr, $($arg:tt)*) => {{
        let _ = $logger.logln($event, &format!($($arg)*));
    }};
}

/// Like `logln!` without the trailing newline
#[macro_export]
macro_rules! log {
    ($logger:expr, $event:expr, $($arg:tt)*) => {{
        let _ = $logger.log($event, &format!($($arg)*));
    }};
}

/// `ERROR` line routed to `event` and every more summarized event
#[macro_export]
macro_rules! errln {
    ($logger:expr, $event:expr, $($arg:tt)*) => {{
        let _ = $logger.errln($event, &format!($($arg)*));
    }};
}

/// `WARNING` line routed like `errln!`
#[macro_export]
macro_rules! warnln {
    ($logger:expr, $event:expr, $($arg:tt)*) => {{
        let _ = $logger.warnln($event, &format!($($arg)*));
    }};
}
