/// FrameClock - frame bookkeeping of the GL device
///
/// GL has no swapchain to acquire from, so a frame is a serial number, a
/// phase and a slot of the frame ring. The default framebuffer is held as a
/// surface view `V`; every non-degenerate resize mints a new one and hands
/// the old one back so the caller can sweep what was built against it.

use lumen_rhi::lumen::render::{Extent2D, FramePhase, FrameRing, FrameStatus};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_debug, rhi_error};

pub(crate) struct FrameClock<V> {
    ring: FrameRing,
    phase: FramePhase,
    /// Incremented on each opened frame; tags frame command lists
    serial: u64,
    extent: Extent2D,
    degenerate: bool,
    surface_view: V,
}

impl<V> FrameClock<V> {
    pub(crate) fn new(frame_count: usize, extent: Extent2D, surface_view: V) -> Self {
        Self {
            ring: FrameRing::new(frame_count),
            phase: FramePhase::Idle,
            serial: 0,
            extent,
            degenerate: extent.is_degenerate(),
            surface_view,
        }
    }

    /// Open a frame; `Skipped` while the surface is degenerate
    pub(crate) fn begin(&mut self) -> Result<FrameStatus> {
        if self.phase != FramePhase::Idle {
            rhi_bail!(InvalidUsage, "lumen::gl", "begin_frame called twice without end_frame");
        }
        if self.degenerate {
            rhi_debug!("lumen::gl", "Surface is degenerate, skipping frame");
            self.phase.begin(FrameStatus::Skipped)?;
            return Ok(FrameStatus::Skipped);
        }
        self.serial += 1;
        self.phase.begin(FrameStatus::Ready)?;
        Ok(FrameStatus::Ready)
    }

    /// Close the frame; a recorded frame is presented through `present`
    /// and the ring advances once it succeeds
    pub(crate) fn end(&mut self, present: impl FnOnce() -> Result<()>) -> Result<()> {
        let phase = self.phase.end().inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;
        if phase == FramePhase::Recording {
            present().inspect_err(|e| rhi_error!("lumen::gl", "Swap failed: {}", e))?;
            self.ring.advance();
        }
        Ok(())
    }

    /// Record a new drawable size
    ///
    /// Returns the retired surface view, or `None` when `size` is degenerate
    /// and frames are skipped until the next resize.
    pub(crate) fn resize(&mut self, size: Extent2D, make_view: impl FnOnce(Extent2D) -> V) -> Result<Option<V>> {
        if self.phase != FramePhase::Idle {
            rhi_bail!(InvalidUsage, "lumen::gl", "on_window_resize called inside a frame");
        }
        self.extent = size;
        if size.is_degenerate() {
            self.degenerate = true;
            return Ok(None);
        }
        self.degenerate = false;
        Ok(Some(std::mem::replace(&mut self.surface_view, make_view(size))))
    }

    /// The surface view, whether or not a frame is open
    pub(crate) fn surface(&self) -> &V {
        &self.surface_view
    }

    /// The surface view while a frame is recording
    pub(crate) fn frame_surface(&self) -> Option<&V> {
        self.phase.is_recording().then_some(&self.surface_view)
    }

    pub(crate) fn is_recording(&self) -> bool {
        self.phase.is_recording()
    }

    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    pub(crate) fn frame_index(&self) -> usize {
        self.ring.current()
    }

    pub(crate) fn frame_count(&self) -> usize {
        self.ring.count()
    }

    pub(crate) fn extent(&self) -> Extent2D {
        self.extent
    }

    pub(crate) fn is_degenerate(&self) -> bool {
        self.degenerate
    }
}

#[cfg(test)]
#[path = "gl_frame_tests.rs"]
mod tests;
