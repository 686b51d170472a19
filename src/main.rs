//! uvcprobe command-line entrypoint

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::info;
use uvcprobe::camera::{DeviceId, DiscoveredCamera, Discovery, DiscoveryOptions};
use uvcprobe::config::ControlBackend;
use uvcprobe::output::{self, Rendered};
use uvcprobe::params::{CliWriter, ControlWriter, NativeWriter, ParamSetter, ValueMode};
use uvcprobe::pipeline::{self, Preview, PreviewOptions, SinkKind};
use uvcprobe::tools::lsusb::{self, UsbInventory};
use uvcprobe::tools::serial::SerialHelper;
use uvcprobe::tools::udev::Udevadm;
use uvcprobe::tools::v4l2ctl::V4l2Ctl;
use uvcprobe::tools::{CommandRunner, SystemRunner, ToolPaths};
use uvcprobe::{Error, ParamStore, Result, UvcConfig, logging};

#[derive(Parser, Debug)]
#[command(name = "uvcprobe", version, about = "Debugging toolkit for UVC cameras on Linux")]
struct Cli {
    /// Optional configuration file (toml/yaml). Defaults to uvcprobe.{toml,yaml} in cwd/XDG config.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Output results as formatted JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List UVC cameras with their VID-PID identifiers
    List,

    /// Show driver info and the control table of a device (all cameras when omitted)
    Info {
        /// Device node, e.g. /dev/video0
        device: Option<String>,

        /// Include menu entries
        #[arg(long)]
        menus: bool,
    },

    /// Print the built-in parameter registry
    Params,

    /// Validate and write controls on one device
    Set {
        /// Device node
        #[arg(short, long)]
        device: String,

        /// NAME=VALUE pairs; NAME may be a control name or id, VALUE a number or option label
        #[arg(required = true, value_name = "NAME=VALUE")]
        assignments: Vec<String>,

        /// Read each control back after writing it
        #[arg(long)]
        verify: bool,
    },

    /// Write registry values to every camera (or one device)
    Apply {
        /// Registry column: default, vendor or user
        #[arg(long)]
        mode: Option<ValueMode>,

        /// Named preset overriding the column for the controls it lists
        #[arg(long)]
        preset: Option<String>,

        /// Write the values saved for each device instead of a registry column
        #[arg(long, conflicts_with_all = ["mode", "preset"])]
        stored: bool,

        /// Restrict to one device node
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Read current control values from a device and save them
    Save {
        /// Device node
        #[arg(short, long)]
        device: String,
    },

    /// List USB devices with target serial numbers, and the video nodes of each card
    Usb,

    /// List serial numbers reported by the vendor helper
    Serials,

    /// Stream every camera through the acquisition pipeline
    Preview {
        /// Stop after this many seconds
        #[arg(long, value_name = "SECS")]
        duration: Option<f64>,

        /// Write the latest frame of each camera as <DIR>/<VID-PID>.jpg
        #[arg(long, value_name = "DIR")]
        snapshot_dir: Option<PathBuf>,

        /// Minimum milliseconds between snapshots of one camera
        #[arg(long, default_value_t = 500)]
        snapshot_interval_ms: u64,

        /// Do not apply saved parameters before streaming
        #[arg(long)]
        no_stored: bool,
    },
}

/// Shared handles built from configuration
struct App {
    config: UvcConfig,
    runner: Arc<dyn CommandRunner>,
    tools: ToolPaths,
    json: bool,
}

impl App {
    fn new(config: UvcConfig, json: bool) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new(config.tools.timeout()));
        let tools = ToolPaths::from(&config.tools);
        Self {
            config,
            runner,
            tools,
            json,
        }
    }

    fn v4l2(&self) -> V4l2Ctl {
        V4l2Ctl::new(self.runner.clone(), self.tools.v4l2_ctl.clone())
    }

    fn udev(&self) -> Udevadm {
        Udevadm::new(self.runner.clone(), self.tools.udevadm.clone())
    }

    fn discovery(&self) -> Discovery {
        Discovery::new(
            self.v4l2(),
            self.udev(),
            DiscoveryOptions::from(&self.config.camera),
        )
    }

    fn setter(&self, verify: bool) -> ParamSetter {
        let writer: Arc<dyn ControlWriter> = match self.config.tools.backend {
            ControlBackend::Cli => Arc::new(CliWriter::new(self.v4l2())),
            ControlBackend::Native => Arc::new(NativeWriter::new()),
        };
        ParamSetter::new(self.config.registry(), writer, self.v4l2())
            .with_verify(verify || self.config.tools.verify_writes)
    }

    fn store(&self) -> ParamStore {
        ParamStore::new(self.config.store.path.clone())
    }

    fn emit(&self, rendered: &Rendered) -> Result<()> {
        rendered.print(self.json)
    }

    /// The given device node, or every discovered camera
    async fn targets(&self, device: Option<&str>) -> Result<Vec<(String, DeviceId)>> {
        match device {
            Some(path) => Ok(vec![(path.to_string(), self.udev().device_id(path).await)]),
            None => {
                let cameras = self.discovery().discover().await?;
                if cameras.is_empty() {
                    return Err(Error::CameraNotFound("no UVC cameras found".to_string()));
                }
                Ok(cameras
                    .into_iter()
                    .map(|DiscoveredCamera { path, id, .. }| (path, id))
                    .collect())
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = UvcConfig::load(cli.config.as_deref())?;
    logging::init(&config.logging)?;
    info!(command = ?cli.command, "uvcprobe starting");

    let app = App::new(config, cli.json);
    match cli.command {
        Command::List => list(&app).await,
        Command::Info { device, menus } => device_info(&app, device.as_deref(), menus).await,
        Command::Params => app.emit(&output::render_registry(&app.config.registry())),
        Command::Set {
            device,
            assignments,
            verify,
        } => set(&app, &device, &assignments, verify).await,
        Command::Apply {
            mode,
            preset,
            stored,
            device,
        } => apply(&app, mode, preset.as_deref(), stored, device.as_deref()).await,
        Command::Save { device } => save(&app, &device).await,
        Command::Usb => usb(&app).await,
        Command::Serials => serials(&app).await,
        Command::Preview {
            duration,
            snapshot_dir,
            snapshot_interval_ms,
            no_stored,
        } => {
            let sink = match snapshot_dir {
                Some(dir) => SinkKind::Snapshot {
                    dir,
                    interval: Duration::from_millis(snapshot_interval_ms),
                },
                None => SinkKind::default(),
            };
            let duration = duration
                .map(Duration::try_from_secs_f64)
                .transpose()
                .map_err(|e| Error::Config(format!("Invalid duration: {e}")))?;
            let options = PreviewOptions {
                sink,
                duration,
                apply_stored: !no_stored,
            };
            preview(&app, options).await
        }
    }
}

async fn list(app: &App) -> Result<()> {
    let cameras = app.discovery().discover().await?;
    app.emit(&output::render_cameras(&cameras))
}

async fn device_info(app: &App, device: Option<&str>, menus: bool) -> Result<()> {
    let v4l2 = app.v4l2();
    for (path, id) in app.targets(device).await? {
        let info = v4l2.driver_info(&path).await?;
        let controls = v4l2.controls(&path, menus).await?;
        app.emit(&output::render_device_info(&path, &id, &info, &controls))?;
    }
    Ok(())
}

async fn set(app: &App, device: &str, assignments: &[String], verify: bool) -> Result<()> {
    let batch = app.setter(verify).set_assignments(device, assignments).await?;

    app.emit(&output::render_set_results(device, &batch.results))?;
    if !batch.failures.is_empty() {
        return Err(Error::Other(format!(
            "{} control write(s) failed",
            batch.failures.len()
        )));
    }
    Ok(())
}

async fn apply(
    app: &App,
    mode: Option<ValueMode>,
    preset: Option<&str>,
    stored: bool,
    device: Option<&str>,
) -> Result<()> {
    let setter = app.setter(false);
    let mode = mode.unwrap_or(app.config.store.mode);
    let preset = preset.map(|name| app.config.preset(name)).transpose()?;
    let store = app.store();

    let mut reports = Vec::new();
    for (path, id) in app.targets(device).await? {
        let outcome = if stored {
            match store.load(&id) {
                Ok(values) if values.is_empty() => {
                    tracing::info!(device = %path, id = %id, "no stored parameters");
                    continue;
                }
                Ok(values) => setter.apply_values(&path, &values).await,
                Err(err) => Err(err),
            }
        } else {
            setter.apply_all(&path, mode, preset.as_ref()).await
        };
        match outcome {
            Ok(report) => reports.push(report),
            Err(err) => tracing::warn!(device = %path, "batch write failed: {err}"),
        }
    }

    app.emit(&output::render_apply_reports(&reports))
}

async fn save(app: &App, device: &str) -> Result<()> {
    let setter = app.setter(false);
    let id = app.udev().device_id(device).await;
    if id.is_unknown() {
        tracing::warn!(device, "saving under UNKNOWN identifier");
    }
    let values = setter.current_values(device).await?;
    let store = app.store();
    store.save(&id, &values)?;
    app.emit(&output::render_saved(
        &id,
        store.path(),
        &values,
        setter.registry(),
    ))
}

async fn usb(app: &App) -> Result<()> {
    let devices = lsusb::list(&app.runner, &app.tools.lsusb).await?;
    let serial = &app.config.serial;
    let mut inventory = UsbInventory::classify(devices, &serial.target_name, &serial.target_ids);

    let helper = SerialHelper::new(app.runner.clone(), serial);
    if helper.is_configured() && !inventory.targets.is_empty() {
        let serials = helper.list().await;
        if serials.len() != inventory.targets.len() {
            tracing::warn!(
                devices = inventory.targets.len(),
                serials = serials.len(),
                "serial count does not match target device count"
            );
        }
        inventory.assign_serials(&serials);
    }

    let groups = match app.v4l2().device_groups().await {
        Ok(groups) => groups,
        Err(err) => {
            tracing::warn!("failed to list video devices: {err}");
            Vec::new()
        }
    };

    app.emit(&output::render_usb(&inventory, &groups, &serial.target_name))
}

async fn serials(app: &App) -> Result<()> {
    let helper = SerialHelper::new(app.runner.clone(), &app.config.serial);
    let serials = helper.try_list().await?;
    app.emit(&output::render_serials(&serials))
}

async fn preview(app: &App, options: PreviewOptions) -> Result<()> {
    let camera = app.config.camera_config()?;
    info!(?camera, "starting preview");

    let stop = Arc::new(AtomicBool::new(false));
    let signal = pipeline::stop_on_ctrl_c(stop.clone());

    let session = Preview::new(
        app.discovery(),
        app.setter(false),
        app.store(),
        camera,
        options,
    );
    let summary = session.run(stop).await;
    signal.abort();

    app.emit(&output::render_preview(&summary?))
}
