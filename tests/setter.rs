use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use uvcprobe::params::CliWriter;
use uvcprobe::tools::v4l2ctl::V4l2Ctl;
use uvcprobe::tools::{CommandOutput, CommandRunner};
use uvcprobe::{Error, ParamRegistry, ParamSetter, Result};

/// Accepts every invocation and records the command lines
#[derive(Default)]
struct RecordingRunner {
    calls: Mutex<Vec<String>>,
}

impl RecordingRunner {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let mut line = vec![program.to_string()];
        line.extend_from_slice(args);
        self.calls.lock().unwrap().push(line.join(" "));
        Ok(CommandOutput::ok(""))
    }
}

fn setter(runner: &Arc<RecordingRunner>) -> ParamSetter {
    let v4l2 = V4l2Ctl::new(runner.clone(), "v4l2-ctl");
    ParamSetter::new(
        ParamRegistry::builtin(),
        Arc::new(CliWriter::new(v4l2.clone())),
        v4l2,
    )
}

#[tokio::test]
async fn out_of_range_values_never_reach_the_setter() {
    let runner = Arc::new(RecordingRunner::default());
    let setter = setter(&runner);

    for (control, value) in [("brightness", 65), ("brightness", -65), ("gain", 0), ("gamma", 501)] {
        let err = setter.set("/dev/video0", control, value).await.unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }), "{control}={value}: {err}");
    }
    let err = setter
        .set("/dev/video0", "power_line_frequency", 3)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidOption { .. }));
    let err = setter
        .set("/dev/video0", "white_balance_automatic", 2)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidOption { .. }));
    let err = setter.set("/dev/video0", "zoom_absolute", 1).await.unwrap_err();
    assert!(matches!(err, Error::ControlUnknown(_)));

    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn boundary_values_are_written() {
    let runner = Arc::new(RecordingRunner::default());
    let setter = setter(&runner);

    setter.set("/dev/video0", "brightness", -64).await.unwrap();
    setter.set("/dev/video0", "0x00980900", 64).await.unwrap();
    assert_eq!(
        runner.calls(),
        vec![
            "v4l2-ctl -d /dev/video0 --set-ctrl=brightness=-64",
            "v4l2-ctl -d /dev/video0 --set-ctrl=brightness=64",
        ]
    );
}
