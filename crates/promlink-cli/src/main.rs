//! Host utility for programming devices over the promlink bus.
//!
//! # Usage
//!
//! ```bash
//! # Write an image into device 33's flash at 0x2000
//! promlink --upload --node_id=33 --address=0x2000 --uri=udp://10.0.0.5:4021 firmware.bin
//!
//! # Read 4 KiB back into a file
//! promlink --download --node_id=33 --address=0x2000 --size=4096 \
//!     --uri=udp://10.0.0.5:4021 readback.bin
//!
//! # Compare device contents against a local image (default action)
//! promlink --node_id=33 --address=0x2000 --uri=udp://10.0.0.5:4021 firmware.bin
//!
//! # Jump into the freshly written firmware
//! promlink --execute=fw --node_id=33 --address=0x2000 --uri=udp://10.0.0.5:4021
//! ```

mod image;
mod transport;

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use promlink_core::{Fault, Master, NodeId, TransferState};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    image::{FileImage, NoImage},
    transport::{UdpRx, UdpTx},
};

/// How long one receive poll blocks before the loop rechecks the clock.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// promlink host utility
#[derive(Parser, Debug)]
#[command(name = "promlink")]
#[command(about = "Program, read back, verify, and boot device memory over the bus")]
#[command(version)]
struct Args {
    /// Upload a bin-file into device memory
    #[arg(long, group = "action")]
    upload: bool,

    /// Download device memory into a file (requires --size)
    #[arg(long, group = "action")]
    download: bool,

    /// Verify a bin-file against device memory (default action)
    #[arg(long, group = "action")]
    verify: bool,

    /// Jump into the bootloader (bl) or firmware (fw) image
    #[arg(long, value_name = "bl|fw", group = "action")]
    execute: Option<ExecImage>,

    /// Node id of the device to program
    #[arg(long = "node_id")]
    node_id: u8,

    /// Device address (hex) the transfer starts at
    #[arg(long, value_parser = parse_hex_addr, default_value = "0x0")]
    address: u32,

    /// Bytes to transfer; for upload/verify 0 means the whole file
    #[arg(long, default_value_t = 0)]
    size: u32,

    /// Transport to the bus gateway, e.g. udp://10.0.0.5:4021
    #[arg(long)]
    uri: String,

    /// Bus id this utility claims for itself
    #[arg(long = "my_id", default_value_t = 1)]
    my_id: u8,

    /// Give up after the device has been silent this many seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Image file to upload, verify against, or download into
    filename: Option<PathBuf>,
}

/// Which image an `--execute` request selects.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ExecImage {
    /// The device's bootloader.
    Bl,
    /// The device's firmware.
    Fw,
}

/// Payload-moving operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferOp {
    Upload,
    Download,
    Verify,
}

/// What one invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Transfer(TransferOp),
    Execute(ExecImage),
}

impl Args {
    fn action(&self) -> Action {
        if self.upload {
            Action::Transfer(TransferOp::Upload)
        } else if self.download {
            Action::Transfer(TransferOp::Download)
        } else if let Some(target) = self.execute {
            Action::Execute(target)
        } else if self.verify {
            Action::Transfer(TransferOp::Verify)
        } else {
            // Verify is also the default: it cannot damage the device.
            Action::Transfer(TransferOp::Verify)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let (tx, mut rx) = transport::open(&args.uri, NodeId(args.my_id))?;

    match args.action() {
        Action::Execute(target) => run_execute(&args, target, tx),
        Action::Transfer(op) => run_transfer(&args, op, tx, &mut rx),
    }
}

fn run_execute(args: &Args, target: ExecImage, tx: UdpTx) -> anyhow::Result<()> {
    let device = NodeId(args.node_id);
    let mut master = Master::new(NodeId(args.my_id), tx, NoImage);
    master.set_target(device, args.address, args.size);

    match target {
        ExecImage::Bl => {
            tracing::info!(%device, "switching to bootloader");
            master.execute_bootloader();
        },
        ExecImage::Fw => {
            tracing::info!(%device, "switching to firmware");
            master.execute_firmware();
        },
    }

    Ok(())
}

fn run_transfer(args: &Args, op: TransferOp, tx: UdpTx, rx: &mut UdpRx) -> anyhow::Result<()> {
    let device = NodeId(args.node_id);
    let path = args.filename.clone().context("this action needs an image file argument")?;

    let image = match op {
        TransferOp::Download => {
            if args.size == 0 {
                bail!("--download needs --size greater than zero");
            }
            FileImage::create_sink(&path)
        },
        TransferOp::Upload | TransferOp::Verify => FileImage::open_source(&path),
    }
    .with_context(|| format!("opening '{}'", path.display()))?;

    let length = match op {
        TransferOp::Download => args.size,
        TransferOp::Upload | TransferOp::Verify => {
            clamp_to_file(args.size, image.len().context("sizing image file")?)
        },
    };

    let mut master = Master::new(NodeId(args.my_id), tx, image);
    master.set_target(device, args.address, length);

    tracing::info!(
        ?op,
        file = %path.display(),
        %device,
        address = format_args!("{:#x}", args.address),
        length,
        "starting transfer"
    );
    match op {
        TransferOp::Upload => master.start_upload(),
        TransferOp::Download => master.start_download(),
        TransferOp::Verify => master.start_verify(),
    }

    drive(&mut master, rx, Duration::from_secs(args.timeout))?;
    report(&master)
}

/// Pump inbound frames into the master until it goes quiet.
///
/// The engines carry no timers, so silence is judged here: if nothing
/// arrives for `timeout`, the transfer is declared stuck, an ABORT releases
/// the slave, and the run fails.
fn drive(
    master: &mut Master<FileImage, UdpTx>,
    rx: &mut UdpRx,
    timeout: Duration,
) -> anyhow::Result<()> {
    let bar = ProgressBar::new(u64::from(master.length()));
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} ({eta})")
            .context("progress template")?,
    );

    let mut last_activity = Instant::now();
    while master.is_busy() {
        if let Some((header, payload)) = rx.poll(POLL_INTERVAL)? {
            master.handle_frame(&header, &payload);
            last_activity = Instant::now();
        } else if last_activity.elapsed() >= timeout {
            master.abort();
            bar.abandon();
            bail!("device {} has been silent for {timeout:?}; transfer aborted", master.peer());
        }
        bar.set_position(u64::from(master.offset()));
    }

    bar.finish_and_clear();
    Ok(())
}

fn report(master: &Master<FileImage, UdpTx>) -> anyhow::Result<()> {
    match master.state() {
        TransferState::Idle => {
            tracing::info!(bytes = master.offset(), "done");
            Ok(())
        },
        TransferState::Error => match master.fault() {
            Some(Fault::Mismatch { offset }) => {
                bail!("verification failed at offset {offset:#x}")
            },
            Some(fault) => bail!("transfer failed: {fault}"),
            None => bail!("transfer failed"),
        },
        state => bail!("transfer left the engine in {state:?}"),
    }
}

/// Transfer length for file-fed operations: `--size`, clamped to the file,
/// with 0 meaning "the whole file".
fn clamp_to_file(size: u32, file_len: u64) -> u32 {
    let file_len = u32::try_from(file_len).unwrap_or(u32::MAX);
    if size == 0 { file_len } else { size.min(file_len) }
}

fn parse_hex_addr(raw: &str) -> Result<u32, String> {
    let digits = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")).unwrap_or(raw);
    u32::from_str_radix(digits, 16).map_err(|err| format!("'{raw}' is not a hex address: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).expect("argv should parse")
    }

    #[test]
    fn verify_is_the_default_action() {
        let args = parse(&["promlink", "--node_id=33", "--uri=udp://h:1", "image.bin"]);
        assert_eq!(args.action(), Action::Transfer(TransferOp::Verify));
    }

    #[test]
    fn actions_are_mutually_exclusive() {
        let result = Args::try_parse_from([
            "promlink",
            "--upload",
            "--download",
            "--node_id=33",
            "--uri=udp://h:1",
            "f",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn execute_selects_the_image() {
        let args =
            parse(&["promlink", "--execute=bl", "--node_id=33", "--uri=udp://h:1"]);
        assert_eq!(args.action(), Action::Execute(ExecImage::Bl));

        let args =
            parse(&["promlink", "--execute=fw", "--node_id=33", "--uri=udp://h:1"]);
        assert_eq!(args.action(), Action::Execute(ExecImage::Fw));
    }

    #[test]
    fn address_accepts_hex() {
        assert_eq!(parse_hex_addr("0x2000"), Ok(0x2000));
        assert_eq!(parse_hex_addr("2000"), Ok(0x2000));
        assert!(parse_hex_addr("0xZZ").is_err());

        let args = parse(&[
            "promlink",
            "--node_id=33",
            "--address=0x0800C000",
            "--uri=udp://h:1",
            "f",
        ]);
        assert_eq!(args.address, 0x0800_C000);
    }

    #[test]
    fn length_clamps_to_the_file() {
        assert_eq!(clamp_to_file(0, 1500), 1500);
        assert_eq!(clamp_to_file(4096, 1500), 1500);
        assert_eq!(clamp_to_file(1024, 1500), 1024);
        assert_eq!(clamp_to_file(0, u64::from(u32::MAX) + 10), u32::MAX);
    }
}
