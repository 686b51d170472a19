//! `v4l2-ctl` invocation and output parsing

use super::{CommandOutput, CommandRunner, split_key_value};
use crate::error::{Error, Result};
use crate::params::{ControlId, MenuOption};
use serde::Serialize;
use std::sync::Arc;

/// Driver and format summary from `v4l2-ctl --all`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DriverInfo {
    /// Kernel driver, e.g. `uvcvideo`
    pub driver: Option<String>,
    /// Card type, usually the USB product string
    pub card: Option<String>,
    /// Bus location
    pub bus_info: Option<String>,
    /// Driver version
    pub driver_version: Option<String>,
    /// Current capture width
    pub width: Option<u32>,
    /// Current capture height
    pub height: Option<u32>,
    /// FourCC of the current pixel format
    pub pixel_format: Option<String>,
    /// Human description of the pixel format
    pub pixel_format_description: Option<String>,
    /// Configured frame rate
    pub frames_per_second: Option<f64>,
}

/// One control line from `v4l2-ctl -l` / `-L`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlLine {
    /// Section header the control appeared under (`User`, `Camera`)
    pub section: Option<String>,
    /// Control name, e.g. `brightness`
    pub name: String,
    /// Control code
    pub id: ControlId,
    /// Raw type string (`int`, `bool`, `menu`, `intmenu`, ...)
    pub kind: String,
    /// Minimum, when reported
    pub min: Option<i64>,
    /// Maximum, when reported
    pub max: Option<i64>,
    /// Step, when reported
    pub step: Option<i64>,
    /// Driver default
    pub default: Option<i64>,
    /// Current value
    pub value: Option<i64>,
    /// Label of the current menu entry, e.g. `50 Hz`
    pub value_label: Option<String>,
    /// Flags such as `inactive`
    pub flags: Option<String>,
    /// Menu entries (only populated from `-L` output)
    pub menu: Vec<MenuOption>,
}

impl ControlLine {
    /// Whether the driver marks the control inactive
    pub fn is_inactive(&self) -> bool {
        self.flags
            .as_deref()
            .is_some_and(|flags| flags.split(',').any(|f| f.trim() == "inactive"))
    }
}

/// A device block from `v4l2-ctl --list-devices`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceGroup {
    /// Card name and bus, as printed by the tool
    pub name: String,
    /// `/dev/video*` nodes belonging to the card
    pub nodes: Vec<String>,
}

/// Parse the `Driver Info` and format sections of `v4l2-ctl --all`.
pub fn parse_driver_info(output: &str) -> DriverInfo {
    let mut info = DriverInfo::default();

    for line in output.lines().map(str::trim) {
        let Some((key, value)) = split_key_value(line, ':') else {
            continue;
        };
        let value = value.to_string();
        match key {
            "Driver name" if info.driver.is_none() => info.driver = Some(value),
            "Card type" if info.card.is_none() => info.card = Some(value),
            "Bus info" if info.bus_info.is_none() => info.bus_info = Some(value),
            "Driver version" if info.driver_version.is_none() => {
                info.driver_version = Some(value)
            }
            "Width/Height" if info.width.is_none() => {
                let resolution = value.split_whitespace().next().unwrap_or("");
                let dims = resolution
                    .split_once('/')
                    .or_else(|| resolution.split_once('x'));
                if let Some((w, h)) = dims {
                    info.width = w.parse().ok();
                    info.height = h.parse().ok();
                }
            }
            "Pixel Format" if info.pixel_format.is_none() => {
                let fourcc = value
                    .split_whitespace()
                    .next()
                    .map(|f| f.trim_matches('\'').to_string());
                info.pixel_format = fourcc;
                info.pixel_format_description = value
                    .find('(')
                    .zip(value.rfind(')'))
                    .filter(|(open, close)| open < close)
                    .map(|(open, close)| value[open + 1..close].to_string());
            }
            "Frames per second" if info.frames_per_second.is_none() => {
                info.frames_per_second = value
                    .split_whitespace()
                    .next()
                    .and_then(|fps| fps.parse().ok());
            }
            _ => {}
        }
    }

    info
}

/// Parse a control listing from `v4l2-ctl -l` or `v4l2-ctl -L`.
///
/// Header lines (`User Controls`, `Camera Controls`) set the section for the
/// controls that follow. Menu entries printed by `-L` are attached to the
/// preceding menu control.
pub fn parse_controls(output: &str) -> Vec<ControlLine> {
    let mut controls: Vec<ControlLine> = Vec::new();
    let mut section: Option<String> = None;

    for raw in output.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if line.ends_with("Controls") && !line.contains("0x") {
            section = line.split_whitespace().next().map(str::to_string);
            continue;
        }

        if let Some(control) = parse_control_line(line, section.as_deref()) {
            controls.push(control);
            continue;
        }

        if let Some(option) = parse_menu_entry(line) {
            if let Some(last) = controls.last_mut() {
                if last.kind.ends_with("menu") {
                    last.menu.push(option);
                }
            }
        }
    }

    controls
}

fn parse_control_line(line: &str, section: Option<&str>) -> Option<ControlLine> {
    let (head, tail) = line.split_once(" : ").or_else(|| line.split_once(':'))?;
    let mut parts = head.split_whitespace();
    let name = parts.next()?;
    let id = parts.next().filter(|id| id.starts_with("0x"))?;
    let kind = parts.next()?;
    if !(kind.starts_with('(') && kind.ends_with(')')) {
        return None;
    }

    let id = ControlId::parse(id).ok()?;
    let mut control = ControlLine {
        section: section.map(str::to_string),
        name: name.to_string(),
        id,
        kind: kind.trim_matches(|c| c == '(' || c == ')').to_string(),
        min: None,
        max: None,
        step: None,
        default: None,
        value: None,
        value_label: None,
        flags: None,
        menu: Vec::new(),
    };

    for token in tail.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        let number = value.parse::<i64>().ok();
        match key {
            "min" => control.min = number,
            "max" => control.max = number,
            "step" => control.step = number,
            "default" => control.default = number,
            "value" => control.value = number,
            "flags" => control.flags = Some(value.to_string()),
            _ => {}
        }
    }

    control.value_label = tail
        .find('(')
        .zip(tail.rfind(')'))
        .filter(|(open, close)| open < close)
        .map(|(open, close)| tail[open + 1..close].trim().to_string());

    Some(control)
}

fn parse_menu_entry(line: &str) -> Option<MenuOption> {
    let (index, label) = split_key_value(line, ':')?;
    let value = index.parse::<i64>().ok()?;
    Some(MenuOption::new(value, label))
}

/// Parse `v4l2-ctl --list-devices` into card groups.
pub fn parse_device_groups(output: &str) -> Vec<DeviceGroup> {
    output
        .trim()
        .split("\n\n")
        .filter_map(|block| {
            let mut lines = block.lines();
            let name = lines.next()?.trim().trim_end_matches(':').to_string();
            let nodes: Vec<String> = lines
                .map(str::trim)
                .filter(|line| line.contains("/dev/video"))
                .map(str::to_string)
                .collect();
            (!nodes.is_empty()).then_some(DeviceGroup { name, nodes })
        })
        .collect()
}

/// Parse `v4l2-ctl --get-ctrl=<name>` output (`name: value`).
pub fn parse_get_ctrl(output: &str, name: &str) -> Result<i64> {
    output
        .lines()
        .filter_map(|line| split_key_value(line, ':'))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| value.split_whitespace().next()?.parse().ok())
        .ok_or_else(|| Error::Parse(format!("no value for {name} in '{}'", output.trim())))
}

/// Thin async wrapper over the `v4l2-ctl` utility
#[derive(Clone)]
pub struct V4l2Ctl {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl V4l2Ctl {
    /// Wrap `program` (normally `v4l2-ctl`) using `runner`
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    async fn invoke(&self, args: Vec<String>) -> Result<CommandOutput> {
        self.runner.run(&self.program, &args).await
    }

    async fn invoke_checked(&self, args: Vec<String>) -> Result<String> {
        let output = self.invoke(args).await?;
        if !output.success() {
            return Err(Error::Tool {
                program: self.program.clone(),
                message: format!(
                    "exited with {:?}: {}",
                    output.code,
                    output.stderr.trim()
                ),
            });
        }
        Ok(output.stdout)
    }

    /// `v4l2-ctl -d <device> --all`
    pub async fn driver_info(&self, device: &str) -> Result<DriverInfo> {
        let stdout = self
            .invoke_checked(vec!["-d".into(), device.into(), "--all".into()])
            .await?;
        Ok(parse_driver_info(&stdout))
    }

    /// `v4l2-ctl -d <device> -l`, or `-L` when `with_menus` is set
    pub async fn controls(&self, device: &str, with_menus: bool) -> Result<Vec<ControlLine>> {
        let flag = if with_menus { "-L" } else { "-l" };
        let stdout = self
            .invoke_checked(vec!["-d".into(), device.into(), flag.into()])
            .await?;
        Ok(parse_controls(&stdout))
    }

    /// `v4l2-ctl -d <device> --get-ctrl=<name>`
    pub async fn get_ctrl(&self, device: &str, name: &str) -> Result<i64> {
        let stdout = self
            .invoke_checked(vec![
                "-d".into(),
                device.into(),
                format!("--get-ctrl={name}"),
            ])
            .await?;
        parse_get_ctrl(&stdout, name)
    }

    /// `v4l2-ctl -d <device> --set-ctrl=<name>=<value>`; the exit status is the only success signal
    pub async fn set_ctrl(&self, device: &str, name: &str, value: i64) -> Result<()> {
        let output = self
            .invoke(vec![
                "-d".into(),
                device.into(),
                format!("--set-ctrl={name}={value}"),
            ])
            .await?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::ControlRejected {
                control: name.to_string(),
                device: device.to_string(),
                stderr: match output.stderr.trim() {
                    "" => format!("exit status {:?}", output.code),
                    text => text.to_string(),
                },
            })
        }
    }

    /// `v4l2-ctl --list-devices`
    pub async fn device_groups(&self) -> Result<Vec<DeviceGroup>> {
        let stdout = self.invoke_checked(vec!["--list-devices".into()]).await?;
        Ok(parse_device_groups(&stdout))
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::tools::testing::ScriptedRunner;

    #[test]
    fn test_parse_driver_info() {
        let info = parse_driver_info(ALL_OUTPUT);
        assert_eq!(info.driver.as_deref(), Some("uvcvideo"));
        assert_eq!(info.card.as_deref(), Some("ViTai F225: ViTai F225"));
        assert_eq!(info.bus_info.as_deref(), Some("usb-0000:00:14.0-2"));
        assert_eq!((info.width, info.height), (Some(640), Some(480)));
        assert_eq!(info.pixel_format.as_deref(), Some("YUYV"));
        assert_eq!(info.pixel_format_description.as_deref(), Some("YUYV 4:2:2"));
        assert_eq!(info.frames_per_second, Some(30.0));
    }

    #[test]
    fn test_parse_driver_info_accepts_x_separator() {
        let info = parse_driver_info("\tWidth/Height      : 1920x1080\n");
        assert_eq!((info.width, info.height), (Some(1920), Some(1080)));
    }

    #[test]
    fn test_parse_controls_sections_and_fields() {
        let controls = parse_controls(CONTROLS_OUTPUT);
        assert_eq!(controls.len(), 7);

        let brightness = &controls[0];
        assert_eq!(brightness.section.as_deref(), Some("User"));
        assert_eq!(brightness.id, ControlId(0x0098_0900));
        assert_eq!(brightness.kind, "int");
        assert_eq!((brightness.min, brightness.max), (Some(-64), Some(64)));
        assert_eq!(brightness.value, Some(-39));

        let awb = &controls[2];
        assert_eq!(awb.kind, "bool");
        assert_eq!(awb.min, None);
        assert_eq!(awb.value, Some(0));

        let wbt = &controls[4];
        assert!(wbt.is_inactive());
        assert_eq!(wbt.step, Some(10));

        let exposure = controls
            .iter()
            .find(|c| c.name == "auto_exposure")
            .expect("auto_exposure listed");
        assert_eq!(exposure.section.as_deref(), Some("Camera"));
        assert_eq!(exposure.value_label.as_deref(), Some("Manual Mode"));
    }

    #[test]
    fn test_parse_controls_attaches_menu_entries() {
        let controls = parse_controls(CONTROLS_OUTPUT);
        let plf = controls
            .iter()
            .find(|c| c.name == "power_line_frequency")
            .expect("power_line_frequency listed");
        assert_eq!(plf.menu.len(), 3);
        assert_eq!(plf.menu[2], MenuOption::new(2, "60 Hz"));
        assert_eq!(plf.value_label.as_deref(), Some("50 Hz"));

        let contrast = &controls[1];
        assert!(contrast.menu.is_empty());
    }

    #[test]
    fn test_parse_device_groups() {
        let output = "ViTai F225: ViTai F225 (usb-0000:00:14.0-2):\n\t/dev/video0\n\t/dev/video1\n\t/dev/media0\n\nHD Webcam (usb-0000:00:14.0-3):\n\t/dev/video2\n\t/dev/video3\n\t/dev/media1\n";
        let groups = parse_device_groups(output);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "ViTai F225: ViTai F225 (usb-0000:00:14.0-2)");
        assert_eq!(groups[0].nodes, vec!["/dev/video0", "/dev/video1"]);
        assert_eq!(groups[1].nodes.len(), 2);
    }

    #[test]
    fn test_parse_get_ctrl() {
        assert_eq!(parse_get_ctrl("brightness: -12\n", "brightness").unwrap(), -12);
        assert!(parse_get_ctrl("contrast: 3\n", "brightness").is_err());
    }

    #[tokio::test]
    async fn test_set_ctrl_passes_value_and_surfaces_stderr() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(
            "v4l2-ctl -d /dev/video0 --set-ctrl=gain",
            CommandOutput::failed(255, "VIDIOC_S_EXT_CTRLS: failed: Input/output error"),
        );
        let ctl = V4l2Ctl::new(runner.clone(), "v4l2-ctl");

        let err = ctl.set_ctrl("/dev/video0", "gain", 64).await.unwrap_err();
        match err {
            Error::ControlRejected { control, stderr, .. } => {
                assert_eq!(control, "gain");
                assert!(stderr.contains("Input/output error"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(
            runner.calls(),
            vec!["v4l2-ctl -d /dev/video0 --set-ctrl=gain=64"]
        );
    }

    #[tokio::test]
    async fn test_driver_info_fails_on_nonzero_exit() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond(
            "v4l2-ctl -d /dev/video9",
            CommandOutput::failed(1, "Cannot open device /dev/video9"),
        );
        let ctl = V4l2Ctl::new(runner, "v4l2-ctl");
        assert!(ctl.driver_info("/dev/video9").await.is_err());
    }
}
