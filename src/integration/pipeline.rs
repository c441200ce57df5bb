//! MonitorPipeline for combining a frame source with the state machine engine.

use tracing::debug;

use crate::error::ModelError;
use crate::fsm::{EngineConfig, FrameOutput, Model, StateMachineEngine};

use super::FrameSource;

/// Bundles a [`FrameSource`] with a [`StateMachineEngine`].
///
/// This struct provides a convenient way to run end-to-end monitoring by
/// pulling frames from any source and feeding them to the engine.
pub struct MonitorPipeline<S: FrameSource> {
    source: S,
    engine: StateMachineEngine,
}

impl<S: FrameSource> MonitorPipeline<S> {
    pub fn new(source: S, config: EngineConfig) -> Self {
        Self {
            source,
            engine: StateMachineEngine::new(config),
        }
    }

    pub fn with_default_config(source: S) -> Self {
        Self::new(source, EngineConfig::default())
    }

    /// Load `model` into the engine. See [`StateMachineEngine::load_model`].
    pub fn load_model(&mut self, model: Model) -> Result<(), ModelError> {
        self.engine.load_model(model)
    }

    /// Pull one frame and process it.
    ///
    /// Returns `Ok(None)` once the source is exhausted.
    pub fn step(&mut self) -> Result<Option<FrameOutput<'_>>, S::Error> {
        let Some(frame) = self.source.next_frame()? else {
            return Ok(None);
        };
        Ok(Some(self.engine.process_frame(&frame)))
    }

    /// Drain the source, returning the number of frames processed.
    pub fn run(&mut self) -> Result<usize, S::Error> {
        self.run_with(|_| {})
    }

    /// Drain the source, handing every output to `on_output`.
    pub fn run_with<F>(&mut self, mut on_output: F) -> Result<usize, S::Error>
    where
        F: FnMut(&FrameOutput<'_>),
    {
        let mut processed = 0;
        while let Some(output) = self.step()? {
            on_output(&output);
            processed += 1;
        }
        debug!("Frame source exhausted after {processed} frames");
        Ok(processed)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn engine(&self) -> &StateMachineEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut StateMachineEngine {
        &mut self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::integration::{FrameBuilder, IterSource};

    struct FailingSource {
        remaining: usize,
    }

    impl FrameSource for FailingSource {
        type Error = &'static str;

        fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
            if self.remaining == 0 {
                return Err("camera disconnected");
            }
            self.remaining -= 1;
            Ok(Some(Frame::new(self.remaining as f64)))
        }
    }

    fn frames() -> Vec<Frame> {
        (0..3)
            .map(|i| {
                FrameBuilder::new()
                    .timestamp(i as f64 * 0.1)
                    .pose_from_tuples(Some(1), [("left_wrist", 0.5, 0.5, 0.9)])
                    .build()
            })
            .collect()
    }

    #[test]
    fn test_monitor_pipeline() {
        let model = Model::from_json(r#"{ "states": [{ "id": "idle", "name": "Idle" }] }"#).unwrap();
        let mut pipeline = MonitorPipeline::with_default_config(IterSource::new(frames()));
        pipeline.load_model(model).unwrap();

        let output = pipeline.step().unwrap().unwrap();
        assert_eq!(output.tracks.len(), 1);
        assert_eq!(output.tracks[0].state_id, "idle");

        let mut seen = 0;
        let processed = pipeline.run_with(|output| seen += output.tracks.len()).unwrap();
        assert_eq!(processed, 2);
        assert_eq!(seen, 2);
        assert!(pipeline.step().unwrap().is_none());
        assert_eq!(pipeline.engine().frame_count(), 3);
    }

    #[test]
    fn test_source_error_propagates() {
        let model = Model::from_json(r#"{ "states": [{ "id": "idle" }] }"#).unwrap();
        let mut pipeline = MonitorPipeline::with_default_config(FailingSource { remaining: 2 });
        pipeline.load_model(model).unwrap();
        assert_eq!(pipeline.run(), Err("camera disconnected"));
        assert_eq!(pipeline.engine().frame_count(), 2);
    }
}
