/// Render pass descriptor: attachments and their load/store operations

use crate::error::{Error, Result};
use crate::renderer::{Api, Extent2D, ResourceMap};

/// RGBA clear color
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const TRANSPARENT: Self = Self { r: 0.0, g: 0.0, b: 0.0, a: 0.0 };
    pub const BLACK: Self = Self { r: 0.0, g: 0.0, b: 0.0, a: 1.0 };
    pub const WHITE: Self = Self { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };

    pub fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_f32_array(&self) -> [f32; 4] {
        [self.r as f32, self.g as f32, self.b as f32, self.a as f32]
    }
}

/// What happens to an attachment's contents when the pass begins
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp<V> {
    /// Clear to the given value
    Clear(V),
    /// Keep the previous contents
    Load,
    /// Contents are undefined
    DontCare,
}

/// What happens to an attachment's contents when the pass ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Operations<V> {
    pub load: LoadOp<V>,
    pub store: StoreOp,
}

impl<V> Operations<V> {
    pub fn clear(value: V) -> Self {
        Self { load: LoadOp::Clear(value), store: StoreOp::Store }
    }

    pub fn load() -> Self {
        Self { load: LoadOp::Load, store: StoreOp::Store }
    }

    pub fn is_load(&self) -> bool {
        matches!(self.load, LoadOp::Load)
    }
}

pub struct RenderPassColorAttachment<'a, A: Api> {
    pub view: &'a A::TextureView,
    /// Multisample resolve target, currently ignored by both backends
    pub resolve_target: Option<&'a A::TextureView>,
    pub ops: Operations<Color>,
}

pub struct RenderPassDepthStencilAttachment<'a, A: Api> {
    pub view: &'a A::TextureView,
    /// `None` leaves depth untouched (loaded and stored)
    pub depth_ops: Option<Operations<f32>>,
    /// `None` leaves stencil untouched (loaded and stored)
    pub stencil_ops: Option<Operations<u32>>,
}

/// Descriptor for `CommandEncoder::begin_render_pass`
pub struct RenderPassDesc<'a, A: Api> {
    pub label: Option<String>,
    pub color_attachments: Vec<RenderPassColorAttachment<'a, A>>,
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment<'a, A>>,
}

impl<'a, A: Api> RenderPassDesc<'a, A> {
    pub fn map<B: Api>(&self, map: &impl ResourceMap<A, B>) -> Result<RenderPassDesc<'a, B>> {
        let mut color_attachments = Vec::with_capacity(self.color_attachments.len());
        for attachment in &self.color_attachments {
            let resolve_target = match attachment.resolve_target {
                Some(view) => Some(map.texture_view(view)?),
                None => None,
            };
            color_attachments.push(RenderPassColorAttachment {
                view: map.texture_view(attachment.view)?,
                resolve_target,
                ops: attachment.ops,
            });
        }
        let depth_stencil_attachment = match &self.depth_stencil_attachment {
            Some(attachment) => Some(RenderPassDepthStencilAttachment {
                view: map.texture_view(attachment.view)?,
                depth_ops: attachment.depth_ops,
                stencil_ops: attachment.stencil_ops,
            }),
            None => None,
        };
        Ok(RenderPassDesc {
            label: self.label.clone(),
            color_attachments,
            depth_stencil_attachment,
        })
    }
}

/// Common extent of a pass's attachments
///
/// Every attachment must have the same size; a pass with no attachment at all
/// is rejected.
pub fn common_attachment_extent<I>(extents: I) -> Result<Extent2D>
where
    I: IntoIterator<Item = Extent2D>,
{
    let mut common: Option<Extent2D> = None;
    for extent in extents {
        match common {
            None => common = Some(extent),
            Some(first) if first != extent => {
                return Err(Error::InvalidUsage(format!(
                    "Render pass attachments differ in size: {}x{} vs {}x{}",
                    first.width, first.height, extent.width, extent.height
                )));
            }
            Some(_) => {}
        }
    }
    common.ok_or_else(|| Error::InvalidUsage("Render pass has no attachment".to_string()))
}

#[cfg(test)]
#[path = "pass_tests.rs"]
mod tests;
