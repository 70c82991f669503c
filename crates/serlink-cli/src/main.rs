use std::fs::File;
use std::io::ErrorKind;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;
use rustyline::{DefaultEditor, ExternalPrinter};
use serial2::{CharSize, FlowControl, Parity, SerialPort, Settings, StopBits};

use serlink_app::{receive_file, send_file};
use serlink_common::channel::{ByteChannel, ChannelOpenError};
use serlink_common::dev_error;
use serlink_common::timer::DeadlineTimer;
use serlink_proto::{ConnectionParams, LinkController, Role};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum CliRole {
    Tx,
    Rx,
}

impl From<CliRole> for Role {
    fn from(r: CliRole) -> Self {
        match r {
            CliRole::Tx => Role::Tx,
            CliRole::Rx => Role::Rx,
        }
    }
}

/// Send or receive a file over a stop-and-wait ARQ serial link.
#[derive(Parser, Debug)]
struct Args {
    /// Serial device path, e.g. /dev/ttyUSB0.
    port: String,

    /// Baud rate.
    baud_rate: u32,

    /// Whether this end sends or receives the file.
    #[clap(long, value_enum)]
    role: CliRole,

    /// File to send (tx role) or to write to (rx role).
    #[clap(long)]
    file: String,

    /// Retransmission budget before a handshake/write/close gives up.
    #[clap(long, default_value_t = 3)]
    retransmissions: u32,

    /// Timer duration in seconds.
    #[clap(long, default_value_t = 3)]
    timeout: u64,

    /// Log retransmission statistics when closing the link.
    #[clap(long)]
    show_statistics: bool,

    /// Mirror log output to a rotating file via flexi_logger instead of
    /// stderr.
    #[clap(long)]
    log_file: Option<String>,

    /// Route log output through a rustyline prompt instead of printing it
    /// directly, and drop to an interactive prompt once the transfer ends.
    #[clap(long)]
    interactive: bool,
}

/// [`ByteChannel`] backed by a real serial port, opened 8-N-1 with no flow
/// control and a zero read timeout so `read_one` never blocks (spec.md's
/// "external collaborators" paragraph).
struct SerialByteChannel {
    port: SerialPort,
}

impl SerialByteChannel {
    fn open(device: &str, baud_rate: u32) -> Result<Self, ChannelOpenError> {
        let port = SerialPort::open(device, |mut settings: Settings| {
            settings.set_raw();
            settings.set_baud_rate(baud_rate)?;
            settings.set_char_size(CharSize::Bits8);
            settings.set_parity(Parity::None);
            settings.set_stop_bits(StopBits::One);
            settings.set_flow_control(FlowControl::None);
            Ok(settings)
        })
        .map_err(|e| ChannelOpenError(e.to_string()))?;
        port.set_read_timeout(Duration::ZERO)
            .map_err(|e| ChannelOpenError(e.to_string()))?;
        Ok(Self { port })
    }
}

impl ByteChannel for SerialByteChannel {
    fn write_all(&mut self, bytes: &[u8]) {
        self.port.write(bytes).expect("serial write failed");
    }

    fn read_one(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(1) => Some(buf[0]),
            Ok(_) => None,
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => None,
            Err(e) => panic!("serial read failed: {e}"),
        }
    }
}

/// Routes log lines through a live rustyline prompt so they don't clobber
/// whatever the user is typing. Mirrors the teacher's unwired
/// `RustyLogWriter`/`ExternalPrinter` pairing in `dxkb-split-link-tester`.
struct RustyLogWriter<P: ExternalPrinter> {
    printer: Arc<Mutex<P>>,
}

impl<P: ExternalPrinter + Send> flexi_logger::writers::LogWriter for RustyLogWriter<P> {
    fn write(&self, _now: &mut flexi_logger::DeferredNow, record: &log::Record) -> std::io::Result<()> {
        let line = format!("[{}] {}\n", record.level(), record.args());
        self.printer
            .lock()
            .expect("rustyline printer lock poisoned")
            .print(line)
            .map_err(|e| std::io::Error::other(e.to_string()))
    }

    fn flush(&self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Wires up logging per `--log-file`/`--interactive`, returning the
/// rustyline editor to drive an interactive prompt from, if requested.
fn init_logging(args: &Args) -> Option<DefaultEditor> {
    if !args.interactive && args.log_file.is_none() {
        env_logger::builder()
            .filter_level(LevelFilter::Info)
            .parse_default_env()
            .init();
        return None;
    }

    let mut logger = flexi_logger::Logger::try_with_str("info")
        .expect("invalid log filter")
        .format(flexi_logger::detailed_format);

    if let Some(path) = &args.log_file {
        logger = logger
            .log_to_file(flexi_logger::FileSpec::default().basename(path.clone()))
            .duplicate_to_stderr(flexi_logger::Duplicate::Warn);
    }

    if args.interactive {
        let mut editor = DefaultEditor::new().expect("failed to start rustyline editor");
        let printer = editor.create_external_printer().expect("failed to create external printer");
        logger = logger.log_to_writer(Box::new(RustyLogWriter { printer: Arc::new(Mutex::new(printer)) }));
        logger.start().expect("failed to start flexi_logger");
        Some(editor)
    } else {
        logger.start().expect("failed to start flexi_logger");
        None
    }
}

fn run_transfer(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let channel = SerialByteChannel::open(&args.port, args.baud_rate)?;
    let params = ConnectionParams {
        device: args.port.clone(),
        baud_rate: args.baud_rate,
        n_retransmissions: args.retransmissions,
        timeout_seconds: args.timeout,
    };

    let mut link =
        LinkController::new(channel, DeadlineTimer::new(), Role::from(args.role), &params);

    link.open()?;

    match args.role {
        CliRole::Tx => {
            let mut source = File::open(&args.file)?;
            let file_size = source.metadata()?.len();
            let file_name = std::path::Path::new(&args.file)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| args.file.clone());
            send_file(&mut link, &mut source, file_size, &file_name)?;
        }
        CliRole::Rx => {
            let mut sink = File::create(&args.file)?;
            receive_file(&mut link, &mut sink)?;
        }
    }

    link.close(args.show_statistics)?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let editor = init_logging(&args);

    if let Err(e) = run_transfer(&args) {
        dev_error!("Transfer failed: {e}");
        return ExitCode::FAILURE;
    }

    if let Some(mut editor) = editor {
        loop {
            match editor.readline("serlink> ") {
                Ok(line) if line.trim() == "quit" || line.trim() == "exit" => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    }

    ExitCode::SUCCESS
}
