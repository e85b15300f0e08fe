//! Fixed-interval sampling of the axis state
//!
//! Every tick reads one axis snapshot, reflects it on the status display,
//! classifies it and dispatches the resulting command. Display and dispatch go
//! through the UI context; classification runs on the timer task.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{classify_sample, AxisState, DirectionCommand, SpeedLevel};
use crate::network::CommandFrame;
use crate::ui::UiHandle;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleLoopSettings {
    /// Delay before the first tick and between ticks
    pub interval_ms: u64,
}

impl Default for SampleLoopSettings {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

pub struct SampleLoop {
    axis: AxisState,
    ui: UiHandle,
    period: Duration,
    speed: SpeedLevel,
}

impl SampleLoop {
    pub fn new(axis: AxisState, ui: UiHandle, settings: &SampleLoopSettings) -> Self {
        Self {
            axis,
            ui,
            period: Duration::from_millis(settings.interval_ms.max(1)),
            speed: SpeedLevel::default(),
        }
    }

    /// Runs a single sampling step and returns the dispatched command
    pub fn tick(&self) -> DirectionCommand {
        let sample = self.axis.snapshot();
        self.ui.set_axis_values(sample);

        let command = classify_sample(&sample);
        debug!(
            "Sampled x={:.4} y={:.4} z={:.4} -> {}",
            sample.x, sample.y, sample.z, command
        );
        self.ui.send_command(CommandFrame::new(command, self.speed));
        command
    }

    /// Spawns the timer task. The first tick fires one period after spawning.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Sample loop started with period {:?}", self.period);
            let mut ticker = interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.tick();
                    }
                }
            }
            info!("Sample loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::AxisSample;
    use crate::testing::{RecordingDisplay, RecordingNetwork};
    use crate::ui::UiContext;

    fn commands(network: &RecordingNetwork) -> Vec<DirectionCommand> {
        network.sent().into_iter().map(|frame| frame.command).collect()
    }

    #[tokio::test]
    async fn retained_x_combines_with_new_y() {
        let network = RecordingNetwork::new();
        let display = RecordingDisplay::default();
        let log = display.log();
        let (ui, _task) = UiContext::spawn(Box::new(display), network.clone());
        let axis = AxisState::new();
        let sampler = SampleLoop::new(axis.clone(), ui.clone(), &SampleLoopSettings::default());

        axis.ingest(AxisSample::new(0.3, 0.0, 0.0));
        assert_eq!(sampler.tick(), DirectionCommand::Forward);

        axis.ingest(AxisSample::new(0.0, 0.3, 0.0));
        assert_eq!(sampler.tick(), DirectionCommand::ForwardLeft);

        ui.flush().await;
        assert_eq!(
            commands(&network),
            vec![DirectionCommand::Forward, DirectionCommand::ForwardLeft]
        );
        assert!(network.sent().iter().all(|frame| frame.speed == 1000));
        assert_eq!(
            log.lock().unwrap().axes,
            vec![AxisSample::new(0.3, 0.0, 0.0), AxisSample::new(0.3, 0.3, 0.0)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_after_one_period() {
        let network = RecordingNetwork::new();
        let (ui, _task) = UiContext::spawn(Box::new(RecordingDisplay::default()), network.clone());
        let cancel = CancellationToken::new();
        let task = SampleLoop::new(AxisState::new(), ui.clone(), &SampleLoopSettings::default())
            .spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(900)).await;
        ui.flush().await;
        assert!(network.sent().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        ui.flush().await;
        assert_eq!(commands(&network), vec![DirectionCommand::Stop]);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        ui.flush().await;
        assert_eq!(network.sent().len(), 2);

        cancel.cancel();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_millis(5000)).await;
        ui.flush().await;
        assert_eq!(network.sent().len(), 2);
    }
}
