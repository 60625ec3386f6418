/// Frame-in-flight bookkeeping shared by both backends

use crate::error::{Error, Result};

/// Outcome of `begin_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// An image was acquired; record and submit as usual
    Ready,
    /// Nothing to draw into (degenerate surface or swapchain just rebuilt)
    Skipped,
}

/// Modulo counter over the swapchain image slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRing {
    index: usize,
    count: usize,
}

impl FrameRing {
    /// Ring of `count` slots starting at 0 (`count` is raised to 1)
    pub fn new(count: usize) -> Self {
        Self { index: 0, count: count.max(1) }
    }

    pub fn current(&self) -> usize {
        self.index
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Move to the next slot, wrapping to 0 after the last one
    pub fn advance(&mut self) -> usize {
        self.index = (self.index + 1) % self.count;
        self.index
    }

    /// Change the slot count; the index restarts at 0 when the count changes
    pub fn resize(&mut self, count: usize) {
        let count = count.max(1);
        if count != self.count {
            self.count = count;
            self.index = 0;
        }
    }
}

/// Where the device is between `begin_frame` and `end_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// No frame open
    Idle,
    /// `begin_frame` acquired an image
    Recording,
    /// `begin_frame` returned `Skipped`
    Skipped,
}

impl FramePhase {
    /// Open a frame with the status `begin_frame` is about to return
    pub fn begin(&mut self, status: FrameStatus) -> Result<()> {
        if *self != FramePhase::Idle {
            return Err(Error::InvalidUsage(
                "begin_frame called twice without end_frame".to_string(),
            ));
        }
        *self = match status {
            FrameStatus::Ready => FramePhase::Recording,
            FrameStatus::Skipped => FramePhase::Skipped,
        };
        Ok(())
    }

    /// Close the frame, returning the phase it was in
    pub fn end(&mut self) -> Result<FramePhase> {
        match *self {
            FramePhase::Idle => Err(Error::InvalidUsage(
                "end_frame called without begin_frame".to_string(),
            )),
            phase => {
                *self = FramePhase::Idle;
                Ok(phase)
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        *self == FramePhase::Recording
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
