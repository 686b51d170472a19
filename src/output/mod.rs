//! Helpers for rendering command results as JSON and terminal text

use crate::camera::{DeviceId, DiscoveredCamera};
use crate::params::{ApplyOutcome, ApplyReport, ControlId, ParamKind, ParamRegistry, SetResult};
use crate::pipeline::PreviewSummary;
use crate::tools::lsusb::{UsbDevice, UsbInventory};
use crate::tools::v4l2ctl::{ControlLine, DeviceGroup, DriverInfo};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::Path;

/// Combined structured and human-readable representation of a result
#[derive(Debug, Clone)]
pub struct Rendered {
    /// Structured JSON representation suitable for downstream consumers
    pub json: Value,
    /// Human-readable lines for terminal presentation
    pub human: Vec<String>,
}

impl Rendered {
    /// Print JSON or human lines to stdout
    pub fn print(&self, as_json: bool) -> crate::Result<()> {
        if as_json {
            println!("{}", serde_json::to_string_pretty(&self.json)?);
        } else {
            for line in &self.human {
                println!("{line}");
            }
        }
        Ok(())
    }
}

/// Discovered cameras
pub fn render_cameras(cameras: &[DiscoveredCamera]) -> Rendered {
    let mut human = Vec::new();
    if cameras.is_empty() {
        human.push("No UVC cameras detected".to_string());
    } else {
        human.push(format!("Discovered cameras ({}):", cameras.len()));
        for camera in cameras {
            human.push(format!(
                "  [{}] {}  {}  {}",
                camera.index,
                camera.path,
                camera.id,
                camera.card.as_deref().unwrap_or("-")
            ));
        }
    }

    Rendered {
        json: json!({ "cameras": cameras }),
        human,
    }
}

fn range_text(line: &ControlLine) -> String {
    match (line.min, line.max) {
        (Some(min), Some(max)) => format!("{min}~{max}"),
        _ => "-".to_string(),
    }
}

/// Driver summary and control table of one device
pub fn render_device_info(
    path: &str,
    id: &DeviceId,
    info: &DriverInfo,
    controls: &[ControlLine],
) -> Rendered {
    let mut human = vec![
        format!("{path} ({id})"),
        format!("  Driver: {}", info.driver.as_deref().unwrap_or("unknown")),
        format!("  Card: {}", info.card.as_deref().unwrap_or("unknown")),
        format!("  Bus: {}", info.bus_info.as_deref().unwrap_or("unknown")),
    ];
    if let (Some(w), Some(h)) = (info.width, info.height) {
        human.push(format!(
            "  Format: {w}x{h} {}",
            info.pixel_format.as_deref().unwrap_or("")
        ));
    }
    if let Some(fps) = info.frames_per_second {
        human.push(format!("  Frame rate: {fps:.3} fps"));
    }

    human.push(format!("  Controls ({}):", controls.len()));
    let mut section = None;
    for line in controls {
        if line.section != section {
            section = line.section.clone();
            if let Some(name) = &section {
                human.push(format!("   {name} Controls"));
            }
        }
        let value = match (&line.value, &line.value_label) {
            (Some(v), Some(label)) => format!("{v} ({label})"),
            (Some(v), None) => v.to_string(),
            _ => "-".to_string(),
        };
        human.push(format!(
            "    {:<32} {} {:<6} {:<12} default={:<6} value={}{}",
            line.name,
            line.id,
            line.kind,
            range_text(line),
            line.default.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
            value,
            if line.is_inactive() { " [inactive]" } else { "" }
        ));
        for option in &line.menu {
            human.push(format!("        {}: {}", option.value, option.label));
        }
    }

    Rendered {
        json: json!({
            "path": path,
            "id": id,
            "driver": info,
            "controls": controls,
        }),
        human,
    }
}

/// The parameter registry as a table
pub fn render_registry(registry: &ParamRegistry) -> Rendered {
    let mut human = vec![format!(
        "{:<28} {:<10} {:<5} {:<12} {:>8} {:>8} {:>8}",
        "control", "id", "kind", "range", "default", "vendor", "user"
    )];
    for param in registry.iter() {
        let range = match param.kind {
            ParamKind::Integer => format!("{}~{}", param.min, param.max),
            ParamKind::Boolean | ParamKind::Menu => param
                .options
                .iter()
                .map(|o| o.value.to_string())
                .collect::<Vec<_>>()
                .join("/"),
        };
        human.push(format!(
            "{:<28} {} {:<5} {:<12} {:>8} {:>8} {:>8}",
            param.control,
            param.id,
            param.kind.as_str(),
            range,
            param.default,
            param.vendor,
            param.user
        ));
        if let Some((required, value)) = param.requires {
            let name = registry
                .get(required)
                .map(|p| p.control.as_str())
                .unwrap_or("?");
            human.push(format!("    requires {name}={value}"));
        }
    }
    let presets: Vec<&str> = registry.preset_names().collect();
    if !presets.is_empty() {
        human.push(format!("Presets: {}", presets.join(", ")));
    }

    Rendered {
        json: serde_json::to_value(registry).unwrap_or(Value::Null),
        human,
    }
}

/// Results of `set`
pub fn render_set_results(device: &str, results: &[SetResult]) -> Rendered {
    let human = results
        .iter()
        .map(|result| match result.readback {
            Some(actual) if result.reverted() => format!(
                "{device}: {} = {} (device reports {actual}, reverted)",
                result.control, result.requested
            ),
            _ => format!("{device}: {} = {}", result.control, result.requested),
        })
        .collect();

    Rendered {
        json: json!({ "device": device, "results": results }),
        human,
    }
}

/// One batch report per device
pub fn render_apply_reports(reports: &[ApplyReport]) -> Rendered {
    let mut human = Vec::new();
    let mut values = Vec::new();

    for report in reports {
        human.push(format!(
            "{}: {} applied, {} skipped, {} failed",
            report.device,
            report.applied(),
            report.skipped(),
            report.failed()
        ));
        let mut entries = Map::new();
        for (control, outcome) in &report.entries {
            if let ApplyOutcome::Failed { value, reason } = outcome {
                human.push(format!("  {control}={value}: {reason}"));
            }
            entries.insert(
                control.clone(),
                serde_json::to_value(outcome).unwrap_or(Value::Null),
            );
        }
        values.push(json!({ "device": report.device, "controls": entries }));
    }

    Rendered {
        json: Value::Array(values),
        human,
    }
}

/// Values written to the parameter store
pub fn render_saved(
    id: &DeviceId,
    path: &Path,
    values: &BTreeMap<ControlId, i64>,
    registry: &ParamRegistry,
) -> Rendered {
    let mut human = vec![format!(
        "Saved {} controls for {id} to {}",
        values.len(),
        path.display()
    )];
    for (control, value) in values {
        let name = registry
            .get(*control)
            .map(|p| p.control.as_str())
            .unwrap_or("?");
        human.push(format!("  {control} {name} = {value}"));
    }

    Rendered {
        json: json!({ "id": id, "path": path, "values": values }),
        human,
    }
}

fn usb_line(device: &UsbDevice) -> String {
    format!(
        "  Bus {} Device {}: {}  {}  [{}]{}",
        device.bus,
        device.device,
        device.vid_pid(),
        if device.name.is_empty() { "-" } else { device.name.as_str() },
        device.manufacturer,
        device
            .serial
            .as_deref()
            .map(|s| format!("  SN {s}"))
            .unwrap_or_default()
    )
}

/// `lsusb` inventory split into target and other devices, followed by the
/// video nodes each capture card exposes
pub fn render_usb(
    inventory: &UsbInventory,
    groups: &[DeviceGroup],
    target_name: &str,
) -> Rendered {
    let mut human = Vec::new();
    if inventory.is_empty() {
        human.push("No USB devices reported".to_string());
    } else {
        human.push(format!("{target_name} devices ({}):", inventory.targets.len()));
        human.extend(inventory.targets.iter().map(usb_line));
        human.push(format!("Other devices ({}):", inventory.others.len()));
        human.extend(inventory.others.iter().map(usb_line));
    }
    for id in &inventory.flagged {
        human.push(format!("Watched id present: {id}"));
    }
    if !groups.is_empty() {
        human.push(format!("Video devices ({}):", groups.len()));
        for group in groups {
            human.push(format!("  {}", group.name));
            human.extend(group.nodes.iter().map(|node| format!("    {node}")));
        }
    }

    let mut json = serde_json::to_value(inventory).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut json {
        map.insert("video_devices".to_string(), json!(groups));
    }
    Rendered { json, human }
}

/// Serial numbers from the vendor helper
pub fn render_serials(serials: &[String]) -> Rendered {
    let human = if serials.is_empty() {
        vec!["No serial numbers reported".to_string()]
    } else {
        serials
            .iter()
            .enumerate()
            .map(|(i, sn)| format!("  [{i}] {sn}"))
            .collect()
    };

    Rendered {
        json: json!({ "serials": serials }),
        human,
    }
}

/// Preview session summary
pub fn render_preview(summary: &PreviewSummary) -> Rendered {
    let mut human = vec![format!(
        "Preview ended ({:?}), {} frames dropped at the queue",
        summary.display.reason, summary.queue_dropped
    )];
    for device in &summary.devices {
        human.push(format!(
            "  {}: captured {} dropped {} read errors {} rendered {}",
            device.device,
            device.captured,
            device.dropped,
            device.read_errors,
            summary.display.rendered.get(&device.device).copied().unwrap_or(0)
        ));
    }

    Rendered {
        json: serde_json::to_value(summary).unwrap_or(Value::Null),
        human,
    }
}
