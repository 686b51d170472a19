//! Built-in control tables

use super::{ControlId, ParamDescriptor, ValueMode};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const BRIGHTNESS: u32 = 0x0098_0900;
const CONTRAST: u32 = 0x0098_0901;
const SATURATION: u32 = 0x0098_0902;
const HUE: u32 = 0x0098_0903;
const WHITE_BALANCE_AUTOMATIC: u32 = 0x0098_090c;
const GAMMA: u32 = 0x0098_0910;
const GAIN: u32 = 0x0098_0913;
const POWER_LINE_FREQUENCY: u32 = 0x0098_0918;
const WHITE_BALANCE_TEMPERATURE: u32 = 0x0098_091a;
const SHARPNESS: u32 = 0x0098_091b;
const BACKLIGHT_COMPENSATION: u32 = 0x0098_091c;
const AUTO_EXPOSURE: u32 = 0x009a_0901;
const EXPOSURE_TIME_ABSOLUTE: u32 = 0x009a_0902;
const EXPOSURE_DYNAMIC_FRAMERATE: u32 = 0x009a_0903;
const FOCUS_ABSOLUTE: u32 = 0x009a_090a;
const FOCUS_AUTOMATIC_CONTINUOUS: u32 = 0x009a_090c;
const PRIVACY: u32 = 0x009a_0910;

/// Manual mode of `auto_exposure`; absolute exposure is ignored otherwise
const EXPOSURE_MANUAL: i64 = 1;

const POWER_LINE_OPTIONS: &[(i64, &str)] = &[(0, "Disabled"), (1, "50 Hz"), (2, "60 Hz")];
const AUTO_EXPOSURE_OPTIONS: &[(i64, &str)] =
    &[(1, "Manual Mode"), (3, "Aperture Priority Mode")];

/// Which built-in table to start from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryProfile {
    /// Generic UVC sensor table
    #[default]
    Uvc,
    /// 1080p "HD WebCam" modules
    HdWebcam,
}

impl RegistryProfile {
    /// Parse a profile name
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().replace('_', "-").as_str() {
            "uvc" => Some(Self::Uvc),
            "hd-webcam" | "hd" => Some(Self::HdWebcam),
            _ => None,
        }
    }
}

/// Ordered set of control descriptors plus named presets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamRegistry {
    params: Vec<ParamDescriptor>,
    presets: BTreeMap<String, BTreeMap<String, i64>>,
}

impl ParamRegistry {
    /// Registry holding `params` in display order
    pub fn new(params: Vec<ParamDescriptor>) -> Self {
        Self {
            params,
            presets: BTreeMap::new(),
        }
    }

    /// Table for `profile`
    pub fn for_profile(profile: RegistryProfile) -> Self {
        match profile {
            RegistryProfile::Uvc => Self::builtin(),
            RegistryProfile::HdWebcam => Self::hd_webcam(),
        }
    }

    /// The sixteen standard UVC controls
    pub fn builtin() -> Self {
        Self::new(vec![
            ParamDescriptor::integer(BRIGHTNESS, "Brightness", "brightness", -64, 64, 1)
                .values(-39, -39, -64),
            ParamDescriptor::integer(CONTRAST, "Contrast", "contrast", 0, 100, 1)
                .values(39, 39, 39),
            ParamDescriptor::integer(SATURATION, "Saturation", "saturation", 0, 100, 1)
                .values(72, 72, 72),
            ParamDescriptor::integer(HUE, "Hue", "hue", -180, 180, 1).values(0, 0, 0),
            ParamDescriptor::boolean(
                WHITE_BALANCE_AUTOMATIC,
                "Auto white balance",
                "white_balance_automatic",
            )
            .values(1, 0, 0),
            ParamDescriptor::integer(GAMMA, "Gamma", "gamma", 100, 500, 1).values(300, 300, 300),
            ParamDescriptor::integer(GAIN, "Gain", "gain", 1, 128, 1).values(64, 64, 64),
            ParamDescriptor::menu(
                POWER_LINE_FREQUENCY,
                "Power line frequency",
                "power_line_frequency",
                POWER_LINE_OPTIONS,
            )
            .values(1, 1, 1),
            ParamDescriptor::integer(
                WHITE_BALANCE_TEMPERATURE,
                "White balance temperature",
                "white_balance_temperature",
                2800,
                6500,
                10,
            )
            .values(6500, 6500, 6000),
            ParamDescriptor::integer(SHARPNESS, "Sharpness", "sharpness", 0, 100, 1)
                .values(75, 75, 75),
            ParamDescriptor::integer(
                BACKLIGHT_COMPENSATION,
                "Backlight compensation",
                "backlight_compensation",
                0,
                2,
                1,
            )
            .values(0, 0, 0),
            ParamDescriptor::menu(
                AUTO_EXPOSURE,
                "Auto exposure",
                "auto_exposure",
                AUTO_EXPOSURE_OPTIONS,
            )
            .values(3, 1, 1),
            ParamDescriptor::integer(
                EXPOSURE_TIME_ABSOLUTE,
                "Exposure time (absolute)",
                "exposure_time_absolute",
                0,
                10000,
                1,
            )
            .values(20, 20, 20)
            .requires(AUTO_EXPOSURE, EXPOSURE_MANUAL),
            ParamDescriptor::boolean(
                EXPOSURE_DYNAMIC_FRAMERATE,
                "Exposure dynamic framerate",
                "exposure_dynamic_framerate",
            )
            .values(0, 0, 1),
            ParamDescriptor::integer(
                FOCUS_ABSOLUTE,
                "Focus (absolute)",
                "focus_absolute",
                0,
                1023,
                1,
            )
            .values(68, 68, 68)
            .requires(FOCUS_AUTOMATIC_CONTINUOUS, 0),
            ParamDescriptor::boolean(
                FOCUS_AUTOMATIC_CONTINUOUS,
                "Continuous autofocus",
                "focus_automatic_continuous",
            )
            .values(1, 1, 1),
        ])
    }

    /// Table for 1080p HD WebCam modules, with their two alternative schemes
    pub fn hd_webcam() -> Self {
        let mut registry = Self::new(vec![
            ParamDescriptor::integer(BRIGHTNESS, "Brightness", "brightness", 0, 255, 1)
                .values(128, 128, 128),
            ParamDescriptor::integer(CONTRAST, "Contrast", "contrast", 0, 255, 1)
                .values(34, 34, 34),
            ParamDescriptor::integer(SATURATION, "Saturation", "saturation", 0, 100, 1)
                .values(58, 58, 58),
            ParamDescriptor::integer(HUE, "Hue", "hue", -180, 180, 1).values(0, 0, 0),
            ParamDescriptor::boolean(
                WHITE_BALANCE_AUTOMATIC,
                "Auto white balance",
                "white_balance_automatic",
            )
            .values(1, 1, 1),
            ParamDescriptor::integer(GAMMA, "Gamma", "gamma", 90, 150, 1).values(120, 120, 120),
            ParamDescriptor::menu(
                POWER_LINE_FREQUENCY,
                "Power line frequency",
                "power_line_frequency",
                POWER_LINE_OPTIONS,
            )
            .values(1, 1, 1),
            ParamDescriptor::integer(
                WHITE_BALANCE_TEMPERATURE,
                "White balance temperature",
                "white_balance_temperature",
                2800,
                6500,
                1,
            )
            .values(4000, 4000, 4000),
            ParamDescriptor::integer(SHARPNESS, "Sharpness", "sharpness", 0, 7, 1)
                .values(2, 2, 2),
            ParamDescriptor::integer(
                BACKLIGHT_COMPENSATION,
                "Backlight compensation",
                "backlight_compensation",
                0,
                2,
                1,
            )
            .values(0, 0, 0),
            ParamDescriptor::menu(
                AUTO_EXPOSURE,
                "Auto exposure",
                "auto_exposure",
                AUTO_EXPOSURE_OPTIONS,
            )
            .values(3, 3, 3),
            ParamDescriptor::integer(
                EXPOSURE_TIME_ABSOLUTE,
                "Exposure time (absolute)",
                "exposure_time_absolute",
                10,
                2500,
                1,
            )
            .values(156, 156, 156)
            .requires(AUTO_EXPOSURE, EXPOSURE_MANUAL),
            ParamDescriptor::boolean(PRIVACY, "Privacy", "privacy").values(0, 0, 0),
        ]);

        for (name, temperature) in [("scheme1", 6000), ("scheme2", 5000)] {
            registry.presets.insert(
                name.to_string(),
                BTreeMap::from([
                    ("white_balance_automatic".to_string(), 0),
                    ("white_balance_temperature".to_string(), temperature),
                ]),
            );
        }

        registry
    }

    /// Descriptors in display order
    pub fn iter(&self) -> impl Iterator<Item = &ParamDescriptor> {
        self.params.iter()
    }

    /// Number of descriptors
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the registry holds no descriptors
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Descriptor by control code
    pub fn get(&self, id: ControlId) -> Option<&ParamDescriptor> {
        self.params.iter().find(|p| p.id == id)
    }

    /// Descriptor by `v4l2-ctl` control name
    pub fn by_name(&self, name: &str) -> Option<&ParamDescriptor> {
        self.params.iter().find(|p| p.control == name)
    }

    /// Resolve a control name or hex/decimal id
    pub fn resolve(&self, key: &str) -> Result<&ParamDescriptor> {
        self.by_name(key)
            .or_else(|| ControlId::parse(key).ok().and_then(|id| self.get(id)))
            .ok_or_else(|| Error::ControlUnknown(key.to_string()))
    }

    /// Replace the user column of `id` after validating the value
    pub fn set_user_value(&mut self, id: ControlId, value: i64) -> Result<()> {
        let param = self
            .params
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::ControlUnknown(id.to_string()))?;
        param.user = param.validate(value)?;
        Ok(())
    }

    /// Register or replace a preset
    pub fn add_preset(&mut self, name: impl Into<String>, values: BTreeMap<String, i64>) {
        self.presets.insert(name.into(), values);
    }

    /// Preset values by name
    pub fn preset(&self, name: &str) -> Option<&BTreeMap<String, i64>> {
        self.presets.get(name)
    }

    /// Names of the known presets
    pub fn preset_names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    /// Values a batch write should use: `mode` column, overridden by `preset` entries
    pub fn planned_values(
        &self,
        mode: ValueMode,
        preset: Option<&BTreeMap<String, i64>>,
    ) -> Vec<(&ParamDescriptor, i64)> {
        self.params
            .iter()
            .map(|param| {
                let value = preset
                    .and_then(|p| p.get(&param.control).copied())
                    .unwrap_or_else(|| param.value_for(mode));
                (param, value)
            })
            .collect()
    }
}

impl Default for ParamRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamKind;

    #[test]
    fn test_builtin_table_is_self_consistent() {
        let registry = ParamRegistry::builtin();
        assert_eq!(registry.len(), 16);
        for param in registry.iter() {
            for mode in [ValueMode::Default, ValueMode::Vendor, ValueMode::User] {
                let value = param.value_for(mode);
                assert!(
                    param.validate(value).is_ok(),
                    "{} {:?} value {} invalid",
                    param.control,
                    mode,
                    value
                );
            }
            if let Some((required, _)) = param.requires {
                assert!(registry.get(required).is_some());
            }
        }
    }

    #[test]
    fn test_hd_webcam_table_and_schemes() {
        let registry = ParamRegistry::for_profile(RegistryProfile::HdWebcam);
        assert_eq!(registry.len(), 13);
        let privacy = registry.resolve("0x009a0910").expect("privacy listed");
        assert_eq!(privacy.kind, ParamKind::Boolean);

        let scheme = registry.preset("scheme2").expect("scheme2");
        let planned = registry.planned_values(ValueMode::Default, Some(scheme));
        let wbt = planned
            .iter()
            .find(|(p, _)| p.control == "white_balance_temperature")
            .expect("planned wbt");
        assert_eq!(wbt.1, 5000);
        for (param, value) in &planned {
            assert!(param.validate(*value).is_ok(), "{}", param.control);
        }
    }

    #[test]
    fn test_resolve_by_name_or_id() {
        let registry = ParamRegistry::builtin();
        assert_eq!(registry.resolve("gain").unwrap().id, ControlId(0x0098_0913));
        assert_eq!(registry.resolve("0x00980913").unwrap().control, "gain");
        assert!(matches!(
            registry.resolve("zoom_absolute"),
            Err(Error::ControlUnknown(_))
        ));
    }

    #[test]
    fn test_set_user_value_validates() {
        let mut registry = ParamRegistry::builtin();
        registry
            .set_user_value(ControlId(0x0098_0913), 100)
            .expect("in range");
        assert_eq!(registry.by_name("gain").unwrap().user, 100);
        assert!(registry.set_user_value(ControlId(0x0098_0913), 500).is_err());
        assert_eq!(registry.by_name("gain").unwrap().user, 100);
        // The shared table is untouched by per-device copies.
        assert_eq!(ParamRegistry::builtin().by_name("gain").unwrap().user, 64);
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(RegistryProfile::parse("HD_WEBCAM"), Some(RegistryProfile::HdWebcam));
        assert_eq!(RegistryProfile::parse("uvc"), Some(RegistryProfile::Uvc));
        assert!(RegistryProfile::parse("gopro").is_none());
    }
}
