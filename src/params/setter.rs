//! Validated control writes against a device node

use super::{ControlId, ControlWriter, ParamDescriptor, ParamRegistry, ValueMode};
use crate::error::{Error, Result};
use crate::tools::v4l2ctl::V4l2Ctl;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Result of a single validated write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetResult {
    /// Control that was written
    pub control: String,
    /// Control code
    pub id: ControlId,
    /// Value requested
    pub requested: i64,
    /// Value read back, when verification is enabled
    pub readback: Option<i64>,
}

impl SetResult {
    /// Whether the device kept a different value than requested
    pub fn reverted(&self) -> bool {
        self.readback.is_some_and(|value| value != self.requested)
    }
}

/// What happened to one control in a batch write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApplyOutcome {
    /// Written successfully
    Applied {
        /// Value written
        value: i64,
    },
    /// Not supported by the device
    Skipped,
    /// Validation or the write failed
    Failed {
        /// Value attempted
        value: i64,
        /// Error text
        reason: String,
    },
}

/// Per-control outcome of [`ParamSetter::apply_all`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    /// Device node the batch ran against
    pub device: String,
    /// Outcome per control, in registry order
    pub entries: Vec<(String, ApplyOutcome)>,
}

impl ApplyReport {
    fn count(&self, pred: impl Fn(&ApplyOutcome) -> bool) -> usize {
        self.entries.iter().filter(|(_, o)| pred(o)).count()
    }

    /// Number of controls written
    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, ApplyOutcome::Applied { .. }))
    }

    /// Number of controls the device does not expose
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ApplyOutcome::Skipped))
    }

    /// Number of controls that failed
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ApplyOutcome::Failed { .. }))
    }
}

/// Writes made by [`ParamSetter::set_assignments`]
#[derive(Debug, Clone, Default)]
pub struct SetBatch {
    /// Controls written, in command-line order
    pub results: Vec<SetResult>,
    /// Controls whose write failed, with the error text
    pub failures: Vec<(String, String)>,
}

/// Registry-aware writer for one or many controls
#[derive(Clone)]
pub struct ParamSetter {
    registry: ParamRegistry,
    writer: Arc<dyn ControlWriter>,
    v4l2: V4l2Ctl,
    verify: bool,
}

impl ParamSetter {
    /// Setter validating against `registry` and writing through `writer`.
    ///
    /// `v4l2` is used to list the controls a device supports.
    pub fn new(registry: ParamRegistry, writer: Arc<dyn ControlWriter>, v4l2: V4l2Ctl) -> Self {
        Self {
            registry,
            writer,
            v4l2,
            verify: false,
        }
    }

    /// Read each control back after writing it
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Registry used for validation
    pub fn registry(&self) -> &ParamRegistry {
        &self.registry
    }

    /// Validate and write one control named by id or `v4l2-ctl` name.
    ///
    /// Nothing is written when validation fails. Controls that require another
    /// control in a particular state (absolute exposure, absolute focus) have
    /// that control written first.
    pub async fn set(&self, device: &str, key: &str, value: i64) -> Result<SetResult> {
        let param = self.registry.resolve(key)?;
        let value = param.validate(value)?;

        if let Some((required, required_value)) = param.requires {
            if let Some(dependency) = self.registry.get(required) {
                tracing::debug!(
                    device,
                    control = %param.control,
                    dependency = %dependency.control,
                    value = required_value,
                    "writing prerequisite control"
                );
                self.writer.write(device, dependency, required_value).await?;
            }
        }

        self.writer.write(device, param, value).await?;

        let readback = if self.verify {
            match self.writer.read(device, param).await {
                Ok(actual) => {
                    if actual != value {
                        tracing::warn!(
                            device,
                            control = %param.control,
                            requested = value,
                            actual,
                            "control reverted by device"
                        );
                    }
                    Some(actual)
                }
                Err(err) => {
                    tracing::warn!(device, control = %param.control, "read-back failed: {err}");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(device, control = %param.control, value, "control set");
        Ok(SetResult {
            control: param.control.clone(),
            id: param.id,
            requested: value,
            readback,
        })
    }

    /// Parse and validate every `NAME=VALUE` assignment.
    ///
    /// Fails on the first invalid assignment, so callers can reject a whole
    /// command line before touching the device.
    pub fn plan_assignments<S: AsRef<str>>(&self, assignments: &[S]) -> Result<Vec<(String, i64)>> {
        assignments
            .iter()
            .map(|assignment| {
                let (key, text) = split_assignment(assignment.as_ref())?;
                let (control, value) = self.parse_assignment(key, text)?;
                self.registry.resolve(&control)?.validate(value)?;
                Ok((control, value))
            })
            .collect()
    }

    /// Validate all assignments, then write them one by one.
    ///
    /// A failed write is recorded and the remaining assignments are still written.
    pub async fn set_assignments<S: AsRef<str>>(
        &self,
        device: &str,
        assignments: &[S],
    ) -> Result<SetBatch> {
        let planned = self.plan_assignments(assignments)?;

        let mut batch = SetBatch::default();
        for (control, value) in planned {
            match self.set(device, &control, value).await {
                Ok(result) => batch.results.push(result),
                Err(err) => {
                    tracing::error!(device, control = %control, "{err}");
                    batch.failures.push((control, err.to_string()));
                }
            }
        }
        Ok(batch)
    }

    /// Write every registry control the device supports, each independently.
    ///
    /// Values come from the `mode` column, overridden by `preset` entries.
    pub async fn apply_all(
        &self,
        device: &str,
        mode: ValueMode,
        preset: Option<&BTreeMap<String, i64>>,
    ) -> Result<ApplyReport> {
        let supported: HashSet<ControlId> = self
            .v4l2
            .controls(device, false)
            .await?
            .into_iter()
            .map(|line| line.id)
            .collect();

        let planned = self.registry.planned_values(mode, preset);
        self.write_planned(device, &supported, planned).await
    }

    /// Write stored `values` keyed by control id, skipping ids the device or registry lacks
    pub async fn apply_values(
        &self,
        device: &str,
        values: &BTreeMap<ControlId, i64>,
    ) -> Result<ApplyReport> {
        let supported: HashSet<ControlId> = self
            .v4l2
            .controls(device, false)
            .await?
            .into_iter()
            .map(|line| line.id)
            .collect();

        let planned = values
            .iter()
            .filter_map(|(id, value)| match self.registry.get(*id) {
                Some(param) => Some((param, *value)),
                None => {
                    tracing::debug!(device, id = %id, "stored control not in registry");
                    None
                }
            })
            .collect();
        self.write_planned(device, &supported, planned).await
    }

    async fn write_planned(
        &self,
        device: &str,
        supported: &HashSet<ControlId>,
        planned: Vec<(&ParamDescriptor, i64)>,
    ) -> Result<ApplyReport> {
        let mut report = ApplyReport {
            device: device.to_string(),
            entries: Vec::with_capacity(planned.len()),
        };

        for (param, value) in planned {
            let outcome = if !supported.contains(&param.id) {
                tracing::info!(device, control = %param.control, "control not supported, skipping");
                ApplyOutcome::Skipped
            } else {
                match self.write_one(device, param, value).await {
                    Ok(()) => ApplyOutcome::Applied { value },
                    Err(err) => {
                        tracing::warn!(
                            device,
                            control = %param.control,
                            value,
                            "write failed: {err}"
                        );
                        ApplyOutcome::Failed {
                            value,
                            reason: err.to_string(),
                        }
                    }
                }
            };
            report.entries.push((param.control.clone(), outcome));
        }

        tracing::info!(
            device,
            applied = report.applied(),
            skipped = report.skipped(),
            failed = report.failed(),
            "batch write finished"
        );
        Ok(report)
    }

    async fn write_one(&self, device: &str, param: &ParamDescriptor, value: i64) -> Result<()> {
        let value = param.validate(value)?;
        self.writer.write(device, param, value).await
    }

    /// Current values of the registry controls the device reports
    pub async fn current_values(&self, device: &str) -> Result<BTreeMap<ControlId, i64>> {
        let lines = self.v4l2.controls(device, false).await?;
        let values = lines
            .into_iter()
            .filter(|line| self.registry.get(line.id).is_some())
            .filter_map(|line| line.value.map(|value| (line.id, value)))
            .collect();
        Ok(values)
    }

    /// Resolve `key` and parse `text` as a value for it
    pub fn parse_assignment(&self, key: &str, text: &str) -> Result<(String, i64)> {
        let param = self.registry.resolve(key)?;
        let value = param.parse_value(text)?;
        Ok((param.control.clone(), value))
    }
}

impl std::fmt::Debug for ParamSetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamSetter")
            .field("controls", &self.registry.len())
            .field("verify", &self.verify)
            .finish()
    }
}

/// Split `name=value` pairs given on the command line
fn split_assignment(text: &str) -> Result<(&str, &str)> {
    crate::tools::split_key_value(text, '=')
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
        .ok_or_else(|| Error::Parse(format!("expected NAME=VALUE, got '{text}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::CliWriter;
    use crate::tools::CommandOutput;
    use crate::tools::testing::ScriptedRunner;
    use crate::tools::v4l2ctl::fixtures::CONTROLS_OUTPUT;

    const DEV: &str = "/dev/video0";

    fn setter(runner: &Arc<ScriptedRunner>) -> ParamSetter {
        let v4l2 = V4l2Ctl::new(runner.clone(), "v4l2-ctl");
        ParamSetter::new(
            ParamRegistry::builtin(),
            Arc::new(CliWriter::new(v4l2.clone())),
            v4l2,
        )
    }

    #[tokio::test]
    async fn test_out_of_range_never_reaches_tool() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("v4l2-ctl", CommandOutput::ok(""));
        let err = setter(&runner).set(DEV, "brightness", 65).await.unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_one_invalid_assignment_blocks_every_write() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("v4l2-ctl", CommandOutput::ok(""));
        let setter = setter(&runner);

        for line in [
            vec!["gain=64", "brightness=65"],
            vec!["gain=64", "zoom_absolute=1"],
            vec!["gain=64", "gamma"],
            vec!["gain=64", "power_line_frequency=Foo"],
        ] {
            assert!(setter.set_assignments(DEV, &line).await.is_err(), "{line:?}");
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_set_assignments_continues_after_failed_write() {
        let runner = Arc::new(ScriptedRunner::new());
        runner
            .respond("v4l2-ctl -d /dev/video0 --set-ctrl", CommandOutput::ok(""))
            .respond(
                "v4l2-ctl -d /dev/video0 --set-ctrl=gain",
                CommandOutput::failed(255, "Input/output error"),
            );

        let batch = setter(&runner)
            .set_assignments(DEV, &["gain=64", "brightness=10"])
            .await
            .expect("assignments valid");

        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].0, "gain");
        assert_eq!(batch.results.len(), 1);
        assert_eq!(batch.results[0].control, "brightness");
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_exposure_forces_manual_mode_first() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("v4l2-ctl -d /dev/video0 --set-ctrl", CommandOutput::ok(""));
        let result = setter(&runner)
            .set(DEV, "exposure_time_absolute", 150)
            .await
            .expect("set ok");
        assert_eq!(result.requested, 150);
        assert_eq!(
            runner.calls(),
            vec![
                "v4l2-ctl -d /dev/video0 --set-ctrl=auto_exposure=1",
                "v4l2-ctl -d /dev/video0 --set-ctrl=exposure_time_absolute=150",
            ]
        );
    }

    #[tokio::test]
    async fn test_verify_reports_reverted_value() {
        let runner = Arc::new(ScriptedRunner::new());
        runner
            .respond("v4l2-ctl -d /dev/video0 --set-ctrl", CommandOutput::ok(""))
            .respond(
                "v4l2-ctl -d /dev/video0 --get-ctrl",
                CommandOutput::ok("gain: 64\n"),
            );
        let result = setter(&runner)
            .with_verify(true)
            .set(DEV, "gain", 100)
            .await
            .expect("set ok");
        assert_eq!(result.readback, Some(64));
        assert!(result.reverted());
    }

    #[tokio::test]
    async fn test_apply_all_skips_unsupported_and_continues_after_failure() {
        let runner = Arc::new(ScriptedRunner::new());
        runner
            .respond("v4l2-ctl -d /dev/video0 -l", CommandOutput::ok(CONTROLS_OUTPUT))
            .respond("v4l2-ctl -d /dev/video0 --set-ctrl", CommandOutput::ok(""))
            .respond(
                "v4l2-ctl -d /dev/video0 --set-ctrl=contrast",
                CommandOutput::failed(255, "Permission denied"),
            );

        let report = setter(&runner)
            .apply_all(DEV, ValueMode::Vendor, None)
            .await
            .expect("apply runs");

        assert_eq!(report.entries.len(), 16);
        assert_eq!(report.applied(), 6);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 9);
        assert_eq!(
            report.entries[0],
            ("brightness".to_string(), ApplyOutcome::Applied { value: -39 })
        );
        assert!(matches!(report.entries[1].1, ApplyOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_preset_overrides_mode_column() {
        let runner = Arc::new(ScriptedRunner::new());
        runner
            .respond("v4l2-ctl -d /dev/video0 -l", CommandOutput::ok(CONTROLS_OUTPUT))
            .respond("v4l2-ctl -d /dev/video0 --set-ctrl", CommandOutput::ok(""));
        let preset = BTreeMap::from([("white_balance_temperature".to_string(), 5000)]);

        setter(&runner)
            .apply_all(DEV, ValueMode::Default, Some(&preset))
            .await
            .expect("apply runs");

        let calls = runner.calls();
        let wrote = |ctrl: &str| calls.contains(&format!("v4l2-ctl -d {DEV} --set-ctrl={ctrl}"));
        assert!(wrote("white_balance_temperature=5000"));
        assert!(wrote("brightness=-39"));
    }

    #[tokio::test]
    async fn test_current_values_from_control_listing() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("v4l2-ctl -d /dev/video0 -l", CommandOutput::ok(CONTROLS_OUTPUT));
        let values = setter(&runner).current_values(DEV).await.expect("values");
        assert_eq!(values.len(), 7);
        assert_eq!(values.get(&ControlId(0x0098_0900)), Some(&-39));
        assert_eq!(values.get(&ControlId(0x009a_0901)), Some(&1));
    }

    #[test]
    fn test_split_assignment() {
        assert_eq!(split_assignment("gain = 12").unwrap(), ("gain", "12"));
        assert!(split_assignment("gain").is_err());
        assert!(split_assignment("gain=").is_err());
    }
}
