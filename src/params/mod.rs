//! V4L2 control parameters
//!
//! A [`ParamDescriptor`] carries everything needed to present one control and
//! to validate a prospective value before it is written: the numeric range for
//! integers, `{0, 1}` for booleans, the option set for menus.

mod registry;
mod setter;
mod writer;

pub use registry::{ParamRegistry, RegistryProfile};
pub use setter::{ApplyOutcome, ApplyReport, ParamSetter, SetBatch, SetResult};
pub use writer::{CliWriter, ControlWriter, NativeWriter};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 32-bit V4L2 control code, written as `0x%08x`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ControlId(pub u32);

impl ControlId {
    /// Parse `0x00980900` (hex) or `9963776` (decimal)
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let parsed = match text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
        {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => text.parse::<u32>(),
        };
        parsed
            .map(ControlId)
            .map_err(|e| Error::Parse(format!("invalid control id '{text}': {e}")))
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl FromStr for ControlId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ControlId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ControlId> for String {
    fn from(id: ControlId) -> Self {
        id.to_string()
    }
}

/// Value domain of a control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// Integer within `min..=max`
    #[serde(rename = "int")]
    Integer,
    /// `0` or `1`
    #[serde(rename = "bool")]
    Boolean,
    /// One of an enumerated option set
    Menu,
}

impl ParamKind {
    /// Short name used in tables
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "int",
            Self::Boolean => "bool",
            Self::Menu => "menu",
        }
    }
}

/// One entry of a menu control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOption {
    /// Value written to the driver
    pub value: i64,
    /// Display label
    pub label: String,
}

impl MenuOption {
    /// Option `value` shown as `label`
    pub fn new(value: i64, label: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
        }
    }
}

/// Which registry column a batch write takes its values from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueMode {
    /// Driver default
    Default,
    /// Factory value recommended by the camera vendor
    Vendor,
    /// Value chosen by the operator
    #[default]
    User,
}

impl ValueMode {
    /// Parse a mode name (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "default" => Some(Self::Default),
            "vendor" | "value" => Some(Self::Vendor),
            "user" | "setvalue" => Some(Self::User),
            _ => None,
        }
    }
}

impl FromStr for ValueMode {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(value)
            .ok_or_else(|| format!("unknown mode '{value}', expected default, vendor or user"))
    }
}

/// Registry entry describing one adjustable control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    /// Control code
    pub id: ControlId,
    /// Human label
    pub label: String,
    /// Name `v4l2-ctl` knows the control by
    pub control: String,
    /// Value domain
    pub kind: ParamKind,
    /// Inclusive minimum
    pub min: i64,
    /// Inclusive maximum
    pub max: i64,
    /// Step between accepted values (informational)
    pub step: Option<i64>,
    /// Driver default
    pub default: i64,
    /// Vendor recommended value
    pub vendor: i64,
    /// Operator's chosen value
    pub user: i64,
    /// Options of a menu control
    pub options: Vec<MenuOption>,
    /// Control that must hold a given value before this one can be written
    pub requires: Option<(ControlId, i64)>,
}

impl ParamDescriptor {
    /// Integer control spanning `min..=max`
    pub fn integer(id: u32, label: &str, control: &str, min: i64, max: i64, step: i64) -> Self {
        Self {
            id: ControlId(id),
            label: label.to_string(),
            control: control.to_string(),
            kind: ParamKind::Integer,
            min,
            max,
            step: Some(step),
            default: min,
            vendor: min,
            user: min,
            options: Vec::new(),
            requires: None,
        }
    }

    /// Boolean control labelled off/on
    pub fn boolean(id: u32, label: &str, control: &str) -> Self {
        Self {
            kind: ParamKind::Boolean,
            max: 1,
            step: None,
            options: vec![MenuOption::new(0, "off"), MenuOption::new(1, "on")],
            ..Self::integer(id, label, control, 0, 1, 1)
        }
    }

    /// Menu control with the given options
    pub fn menu(id: u32, label: &str, control: &str, options: &[(i64, &str)]) -> Self {
        let options: Vec<MenuOption> = options
            .iter()
            .map(|(value, label)| MenuOption::new(*value, *label))
            .collect();
        let min = options.iter().map(|o| o.value).min().unwrap_or(0);
        let max = options.iter().map(|o| o.value).max().unwrap_or(0);
        Self {
            kind: ParamKind::Menu,
            step: None,
            options,
            ..Self::integer(id, label, control, min, max, 1)
        }
    }

    /// Set default, vendor and user columns
    pub fn values(mut self, default: i64, vendor: i64, user: i64) -> Self {
        self.default = default;
        self.vendor = vendor;
        self.user = user;
        self
    }

    /// Record that `control` must equal `value` before this control is written
    pub fn requires(mut self, control: u32, value: i64) -> Self {
        self.requires = Some((ControlId(control), value));
        self
    }

    /// Value of the column selected by `mode`
    pub fn value_for(&self, mode: ValueMode) -> i64 {
        match mode {
            ValueMode::Default => self.default,
            ValueMode::Vendor => self.vendor,
            ValueMode::User => self.user,
        }
    }

    /// Label of the option carrying `value`
    pub fn option_label(&self, value: i64) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.label.as_str())
    }

    /// Resolve an option label (case-insensitive) or a numeric string to a value
    pub fn parse_value(&self, text: &str) -> Result<i64> {
        let text = text.trim();
        if let Ok(value) = text.parse::<i64>() {
            return Ok(value);
        }
        if self.kind == ParamKind::Boolean {
            match text.to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" => return Ok(1),
                "false" | "off" | "no" => return Ok(0),
                _ => {}
            }
        }
        self.options
            .iter()
            .find(|o| o.label.eq_ignore_ascii_case(text))
            .map(|o| o.value)
            .ok_or_else(|| Error::Parse(format!("{}: cannot interpret '{text}'", self.control)))
    }

    /// Check `value` against the control's domain without touching the device.
    pub fn validate(&self, value: i64) -> Result<i64> {
        match self.kind {
            ParamKind::Integer => {
                if value < self.min || value > self.max {
                    return Err(Error::OutOfRange {
                        control: self.control.clone(),
                        value,
                        min: self.min,
                        max: self.max,
                    });
                }
            }
            ParamKind::Boolean | ParamKind::Menu => {
                if !self.options.iter().any(|o| o.value == value) {
                    return Err(Error::InvalidOption {
                        control: self.control.clone(),
                        value,
                        allowed: self
                            .options
                            .iter()
                            .map(|o| o.value.to_string())
                            .collect::<Vec<_>>()
                            .join(", "),
                    });
                }
            }
        }
        Ok(value)
    }
}
