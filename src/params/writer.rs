//! Control write backends

use super::ParamDescriptor;
use crate::error::{Error, Result};
use crate::tools::v4l2ctl::V4l2Ctl;
use async_trait::async_trait;
use v4l::control::{Control, Value};

/// Writes (and reads back) a single control on a device node
#[async_trait]
pub trait ControlWriter: Send + Sync {
    /// Write `value`; the caller has already validated it
    async fn write(&self, device: &str, param: &ParamDescriptor, value: i64) -> Result<()>;

    /// Current value as reported by the driver
    async fn read(&self, device: &str, param: &ParamDescriptor) -> Result<i64>;
}

/// Writes through `v4l2-ctl --set-ctrl`
#[derive(Clone)]
pub struct CliWriter {
    v4l2: V4l2Ctl,
}

impl CliWriter {
    /// Writer delegating to `v4l2`
    pub fn new(v4l2: V4l2Ctl) -> Self {
        Self { v4l2 }
    }
}

#[async_trait]
impl ControlWriter for CliWriter {
    async fn write(&self, device: &str, param: &ParamDescriptor, value: i64) -> Result<()> {
        self.v4l2.set_ctrl(device, &param.control, value).await
    }

    async fn read(&self, device: &str, param: &ParamDescriptor) -> Result<i64> {
        self.v4l2.get_ctrl(device, &param.control).await
    }
}

/// Issues `VIDIOC_S_CTRL` / `VIDIOC_G_CTRL` through the v4l bindings
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeWriter;

impl NativeWriter {
    /// Native writer
    pub fn new() -> Self {
        Self
    }
}

fn open(device: &str) -> Result<v4l::Device> {
    v4l::Device::with_path(device)
        .map_err(|e| Error::Camera(format!("Failed to open {device}: {e}")))
}

#[async_trait]
impl ControlWriter for NativeWriter {
    async fn write(&self, device: &str, param: &ParamDescriptor, value: i64) -> Result<()> {
        let device = device.to_string();
        let control = param.control.clone();
        let id = param.id.0;

        tokio::task::spawn_blocking(move || {
            let dev = open(&device)?;
            dev.set_control(Control {
                id,
                value: Value::Integer(value),
            })
            .map_err(|e| Error::ControlRejected {
                control,
                device: device.clone(),
                stderr: e.to_string(),
            })
        })
        .await
        .map_err(|e| Error::Other(format!("control write task failed: {e}")))?
    }

    async fn read(&self, device: &str, param: &ParamDescriptor) -> Result<i64> {
        let device = device.to_string();
        let id = param.id.0;

        tokio::task::spawn_blocking(move || {
            let dev = open(&device)?;
            let control = dev
                .control(id)
                .map_err(|e| Error::Camera(format!("Failed to read control {id:#010x}: {e}")))?;
            match control.value {
                Value::Integer(value) => Ok(value),
                Value::Boolean(flag) => Ok(i64::from(flag)),
                other => Err(Error::Parse(format!(
                    "control {id:#010x} has non-integer value {other:?}"
                ))),
            }
        })
        .await
        .map_err(|e| Error::Other(format!("control read task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamRegistry;
    use crate::tools::CommandOutput;
    use crate::tools::testing::ScriptedRunner;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cli_writer_builds_set_ctrl() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("v4l2-ctl -d /dev/video0 --set-ctrl", CommandOutput::ok(""));
        let writer = CliWriter::new(V4l2Ctl::new(runner.clone(), "v4l2-ctl"));
        let registry = ParamRegistry::builtin();
        let gain = registry.by_name("gain").unwrap();

        writer.write("/dev/video0", gain, 80).await.expect("write ok");
        assert_eq!(
            runner.calls(),
            vec!["v4l2-ctl -d /dev/video0 --set-ctrl=gain=80"]
        );
    }

    #[tokio::test]
    async fn test_cli_writer_surfaces_stderr() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(
            "v4l2-ctl -d /dev/video0 --set-ctrl",
            CommandOutput::failed(255, "VIDIOC_S_EXT_CTRLS: failed: Input/output error"),
        );
        let writer = CliWriter::new(V4l2Ctl::new(runner, "v4l2-ctl"));
        let registry = ParamRegistry::builtin();
        let err = writer
            .write("/dev/video0", registry.by_name("hue").unwrap(), 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ControlRejected { ref stderr, .. } if stderr.contains("Input/output")
        ));
    }

    #[tokio::test]
    async fn test_native_writer_missing_node() {
        let registry = ParamRegistry::builtin();
        let err = NativeWriter::new()
            .write("/nonexistent/video99", registry.by_name("gain").unwrap(), 64)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Camera(_)));
    }
}
