//! Vendor serial-number helper
//!
//! The vendor SDK is only reachable through a separate program that prints one
//! serial number per line. uvcprobe runs it and keeps the lines carrying the
//! configured prefix.

use super::CommandRunner;
use crate::config::SerialOptions;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Runs the configured serial-number helper
#[derive(Clone)]
pub struct SerialHelper {
    runner: Arc<dyn CommandRunner>,
    command: Option<String>,
    args: Vec<String>,
    prefix: String,
}

impl SerialHelper {
    /// Helper described by `options`
    pub fn new(runner: Arc<dyn CommandRunner>, options: &SerialOptions) -> Self {
        Self {
            runner,
            command: options.command.clone(),
            args: options.args.clone(),
            prefix: options.prefix.clone(),
        }
    }

    /// Whether a helper command is configured
    pub fn is_configured(&self) -> bool {
        self.command.is_some()
    }

    /// Serial numbers reported by the helper, or an error when it cannot be run
    pub async fn try_list(&self) -> Result<Vec<String>> {
        let Some(command) = self.command.as_deref() else {
            return Err(Error::Config(
                "serial.command is not configured".to_string(),
            ));
        };

        let output = self.runner.run(command, &self.args).await?;
        if !output.success() {
            return Err(Error::Tool {
                program: command.to_string(),
                message: output.stderr.trim().to_string(),
            });
        }

        Ok(filter_serials(&output.stdout, &self.prefix))
    }

    /// Serial numbers, or an empty list (logged) when the helper fails
    pub async fn list(&self) -> Vec<String> {
        match self.try_list().await {
            Ok(serials) => serials,
            Err(err) => {
                tracing::warn!("serial number lookup failed: {err}");
                Vec::new()
            }
        }
    }
}

/// Keep trimmed lines that start with `prefix`
pub fn filter_serials(output: &str, prefix: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.starts_with(prefix))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::CommandOutput;
    use crate::tools::testing::ScriptedRunner;

    fn options(command: Option<&str>) -> SerialOptions {
        SerialOptions {
            command: command.map(str::to_string),
            ..SerialOptions::default()
        }
    }

    #[test]
    fn test_filter_serials_by_prefix() {
        let out = "SDK v1.2 loaded\nGF225A0001\n  GF225A0002  \nerror: none\n";
        assert_eq!(filter_serials(out, "GF225"), vec!["GF225A0001", "GF225A0002"]);
    }

    #[tokio::test]
    async fn test_failure_yields_empty_list() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("/opt/vendor/sn", CommandOutput::failed(1, "no SDK"));
        let helper = SerialHelper::new(runner, &options(Some("/opt/vendor/sn")));
        assert!(helper.try_list().await.is_err());
        assert!(helper.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_helper() {
        let helper = SerialHelper::new(Arc::new(ScriptedRunner::new()), &options(None));
        assert!(!helper.is_configured());
        assert!(helper.list().await.is_empty());
    }
}
