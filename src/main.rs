//! Webcam-registry binary for inspecting and exercising configured cameras.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{debug, info};

use webcam_registry::config::ConfigStore;
use webcam_registry::discovery::{DeviceDiscovery, SysfsDiscovery};
use webcam_registry::logging::init_logging;
use webcam_registry::{
    lock_manager, CaptureBackend, CaptureError, ConfigSource, Device, MockBackend, Registry,
    V4l2Backend,
};

/// Empty reads tolerated per requested frame before a camera gives up.
const MAX_EMPTY_READS: u32 = 10;
const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(20);

#[derive(Parser, Debug)]
#[command(name = "webcam-registry", version, about = "Open, rotate and capture configured cameras")]
struct Cli {
    /// TOML file with a `webcam_plugin.devices` list
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use generated test-pattern cameras instead of V4L2 devices
    #[arg(long = "virtual", global = true)]
    virtual_cameras: bool,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every configured camera and its state
    List,
    /// Capture frames from active cameras
    Capture {
        /// Only capture from the camera with this name
        #[arg(short, long)]
        name: Option<String>,

        /// Frames to capture per camera
        #[arg(short, long, default_value_t = 5)]
        frames: u32,
    },
    /// Print capture devices found on the system
    Discover,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs);

    if let Err(err) = run(cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> io::Result<()> {
    if matches!(cli.command, Command::Discover) {
        return discover();
    }

    let backend: Arc<dyn CaptureBackend> = if cli.virtual_cameras {
        Arc::new(MockBackend::virtual_rig())
    } else {
        Arc::new(V4l2Backend)
    };
    let source: Arc<dyn ConfigSource> = match &cli.config {
        Some(path) => Arc::new(ConfigStore::load(path)),
        None => Arc::new(ConfigStore::new()),
    };
    let registry = Registry::new(backend, source).with_discovery(Arc::new(SysfsDiscovery::default()));

    let manager = registry.get_instance();
    let result = match cli.command {
        Command::List => {
            lock_manager(&manager).list_cameras();
            Ok(())
        }
        Command::Capture { name, frames } => {
            let mut manager = lock_manager(&manager);
            let cameras: Vec<&mut Device> = manager
                .active_cameras_mut()
                .filter(|camera| name.as_deref().map_or(true, |n| camera.name() == n))
                .collect();
            capture_all(cameras, frames, name.as_deref())
        }
        Command::Discover => Ok(()),
    };

    registry.reset();
    result
}

fn discover() -> io::Result<()> {
    let devices = SysfsDiscovery::default().list_devices();
    let mut out = io::stdout().lock();
    writeln!(out, "Devices ({}):", devices.len())?;
    for device in devices {
        writeln!(out, "{:15} | {}", device.path.display(), device.description)?;
    }
    Ok(())
}

fn capture_all(cameras: Vec<&mut Device>, frames: u32, name: Option<&str>) -> io::Result<()> {
    if cameras.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            name.map_or_else(
                || "no active cameras".to_owned(),
                |n| format!("camera '{n}' is not active"),
            ),
        ));
    }

    let reports: Vec<String> = thread::scope(|scope| {
        let workers: Vec<_> = cameras
            .into_iter()
            .map(|camera| scope.spawn(move || capture_frames(camera, frames)))
            .collect();
        workers
            .into_iter()
            .map(|worker| {
                worker
                    .join()
                    .unwrap_or_else(|_| "capture thread panicked".to_owned())
            })
            .collect()
    });

    let mut out = io::stdout().lock();
    for report in reports {
        writeln!(out, "{report}")?;
    }
    Ok(())
}

fn capture_frames(camera: &mut Device, frames: u32) -> String {
    let mut captured = 0;
    let mut empty_reads = 0;
    let mut last_size = camera.get_resolution();

    while captured < frames {
        match camera.get_frame() {
            Ok(frame) => {
                debug!(
                    name = camera.name(),
                    sequence = frame.metadata().sequence,
                    "{}x{} frame",
                    frame.width(),
                    frame.height()
                );
                last_size = (frame.width(), frame.height());
                captured += 1;
                empty_reads = 0;
            }
            Err(CaptureError::NoFrame) if empty_reads < MAX_EMPTY_READS => {
                empty_reads += 1;
                thread::sleep(EMPTY_READ_BACKOFF);
            }
            Err(err) => {
                return format!(
                    "{}: stopped after {captured}/{frames} frames: {err}",
                    camera.name()
                )
            }
        }
    }

    info!(name = camera.name(), captured, "capture finished");
    format!(
        "{}: {captured} frames at {}x{} ({})",
        camera.name(),
        last_size.0,
        last_size.1,
        camera.orientation()
    )
}
