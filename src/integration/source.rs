//! Trait for frame producers.

use std::convert::Infallible;

use crate::frame::Frame;

/// A producer of detection frames.
///
/// Implement this to connect a camera loop, a recorded session or a network
/// feed to [`MonitorPipeline`](super::MonitorPipeline).
///
/// # Example
///
/// ```ignore
/// use motion_fsm::{Frame, FrameSource};
///
/// struct Replay {
///     lines: std::io::Lines<std::io::BufReader<std::fs::File>>,
/// }
///
/// impl FrameSource for Replay {
///     type Error = std::io::Error;
///
///     fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
///         let Some(line) = self.lines.next().transpose()? else {
///             return Ok(None);
///         };
///         Ok(Some(serde_json::from_str(&line)?))
///     }
/// }
/// ```
pub trait FrameSource {
    /// Error type for acquisition failures.
    type Error;

    /// Produce the next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error>;
}

/// Adapts any iterator of frames into an infallible [`FrameSource`].
#[derive(Debug, Clone)]
pub struct IterSource<I> {
    frames: I,
}

impl<I: Iterator<Item = Frame>> IterSource<I> {
    pub fn new(frames: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }
}

impl<I: Iterator<Item = Frame>> FrameSource for IterSource<I> {
    type Error = Infallible;

    fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
        Ok(self.frames.next())
    }
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    type Error = S::Error;

    fn next_frame(&mut self) -> Result<Option<Frame>, Self::Error> {
        (**self).next_frame()
    }
}
