//! Collaborator interfaces of the render core.
//!
//! [`RenderBackend`] is the GPU side (hardware or software, picked once at
//! startup and shared by every output). [`DisplayBackend`] is the per-output
//! presentation side: swapchain, buffer damage, commits and direct scanout.

pub mod headless;
pub mod software;

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
    time::Duration,
};

use bytemuck::{Pod, Zeroable};
use smithay::utils::{Buffer, Logical, Physical, Rectangle, Size, Transform};

use crate::{
    errors::Result,
    region::{Region, scale_rect_outward},
};

pub use headless::HeadlessDisplay;
pub use software::SoftwareRenderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepthId(pub u64);

/// Straight-alpha RGBA color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn is_opaque(&self) -> bool {
        self.a >= 1.0
    }

    pub fn with_alpha(self, alpha: f32) -> Self {
        Self {
            a: (self.a * alpha).clamp(0.0, 1.0),
            ..self
        }
    }

    pub fn to_argb8888(self) -> u32 {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
        (channel(self.a) << 24) | (channel(self.r) << 16) | (channel(self.g) << 8) | channel(self.b)
    }

    pub fn from_argb8888(pixel: u32) -> Self {
        let channel = |shift: u32| ((pixel >> shift) & 0xff) as f32 / 255.0;
        Self::new(channel(16), channel(8), channel(0), channel(24))
    }
}

impl From<[f32; 4]> for Color {
    fn from(value: [f32; 4]) -> Self {
        Color::new(value[0], value[1], value[2], value[3])
    }
}

/// A bound color buffer plus the coordinate transform used to draw into it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTarget {
    pub buffer: BufferId,
    /// Buffer dimensions in device pixels, in buffer orientation.
    pub size: Size<i32, Physical>,
    pub scale: f64,
    pub transform: Transform,
    /// Extra vertical flip compensating for offscreen Y inversion.
    pub y_flip: bool,
    /// Whether `buffer` is the display's own buffer rather than an offscreen one.
    pub is_default_target: bool,
}

impl RenderTarget {
    pub fn new(
        buffer: BufferId,
        size: Size<i32, Physical>,
        scale: f64,
        transform: Transform,
        is_default_target: bool,
    ) -> Self {
        Self {
            buffer,
            size,
            scale,
            transform,
            y_flip: false,
            is_default_target,
        }
    }

    /// Retarget the same geometry onto another buffer.
    pub fn with_buffer(&self, buffer: BufferId, is_default_target: bool) -> Self {
        Self {
            buffer,
            is_default_target,
            y_flip: false,
            ..self.clone()
        }
    }

    pub fn with_y_flip(mut self, y_flip: bool) -> Self {
        self.y_flip = y_flip;
        self
    }

    /// Size in device pixels, in output orientation.
    pub fn output_size(&self) -> Size<i32, Physical> {
        self.transform.transform_size(self.size)
    }

    pub fn logical_size(&self) -> Size<i32, Logical> {
        let size = self.output_size();
        Size::from((
            (size.w as f64 / self.scale).round() as i32,
            (size.h as f64 / self.scale).round() as i32,
        ))
    }

    pub fn framebuffer_box(&self, rect: Rectangle<i32, Logical>) -> Rectangle<i32, Physical> {
        let physical: Rectangle<i32, Physical> = scale_rect_outward(rect, self.scale, self.scale);
        let mut rect = self
            .transform
            .invert()
            .transform_rect_in(physical, &self.output_size());
        if self.y_flip {
            rect.loc.y = self.size.h - rect.loc.y - rect.size.h;
        }
        rect
    }

    pub fn framebuffer_region(&self, region: &Region<Logical>) -> Vec<Rectangle<i32, Physical>> {
        region
            .rects()
            .iter()
            .map(|rect| self.framebuffer_box(*rect))
            .collect()
    }
}

/// GPU rendering interface.
///
/// Every drawing call must happen between [`begin`](Self::begin) and
/// [`end`](Self::end); after `end` the backend is back in its rest state.
pub trait RenderBackend {
    fn name(&self) -> &str;

    fn create_buffer(&mut self, size: Size<i32, Physical>) -> Result<BufferId>;
    fn resize_buffer(&mut self, buffer: BufferId, size: Size<i32, Physical>) -> Result<()>;
    fn release_buffer(&mut self, buffer: BufferId);
    fn buffer_size(&self, buffer: BufferId) -> Option<Size<i32, Physical>>;
    /// Upload client pixels (ARGB8888) as a texture.
    fn import_pixels(&mut self, size: Size<i32, Physical>, pixels: &[u32]) -> Result<BufferId>;

    fn create_depth(&mut self, size: Size<i32, Physical>) -> Result<DepthId>;
    fn release_depth(&mut self, depth: DepthId);
    fn attach_depth(&mut self, buffer: BufferId, depth: DepthId) -> Result<()>;

    fn begin(&mut self, target: &RenderTarget) -> Result<()>;
    fn end(&mut self);
    fn clear(&mut self, color: Color, damage: &[Rectangle<i32, Physical>]) -> Result<()>;
    fn draw_texture(
        &mut self,
        texture: BufferId,
        dst: Rectangle<i32, Physical>,
        damage: &[Rectangle<i32, Physical>],
        alpha: f32,
    ) -> Result<()>;
    fn draw_rect(
        &mut self,
        color: Color,
        dst: Rectangle<i32, Physical>,
        damage: &[Rectangle<i32, Physical>],
    ) -> Result<()>;

    /// Whether offscreen targets come out vertically inverted relative to the display.
    fn offscreen_y_inverted(&self) -> bool {
        false
    }

    /// No target bound, no drawing scope open.
    fn is_at_rest(&self) -> bool;
}

pub type SharedRenderer = Rc<RefCell<dyn RenderBackend>>;

/// Owned color buffer, released when dropped.
pub struct GpuBuffer {
    id: BufferId,
    size: Size<i32, Physical>,
    renderer: Weak<RefCell<dyn RenderBackend>>,
}

impl GpuBuffer {
    pub fn allocate(renderer: &SharedRenderer, size: Size<i32, Physical>) -> Result<Self> {
        let id = renderer.borrow_mut().create_buffer(size)?;
        Ok(Self {
            id,
            size,
            renderer: Rc::downgrade(renderer),
        })
    }

    /// Upload client pixels and own the resulting texture.
    pub fn import(
        renderer: &SharedRenderer,
        size: Size<i32, Physical>,
        pixels: &[u32],
    ) -> Result<Self> {
        let id = renderer.borrow_mut().import_pixels(size, pixels)?;
        Ok(Self {
            id,
            size,
            renderer: Rc::downgrade(renderer),
        })
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn size(&self) -> Size<i32, Physical> {
        self.size
    }

    pub fn ensure_size(&mut self, size: Size<i32, Physical>) -> Result<()> {
        if self.size == size {
            return Ok(());
        }
        if let Some(renderer) = self.renderer.upgrade() {
            renderer.borrow_mut().resize_buffer(self.id, size)?;
        }
        self.size = size;
        Ok(())
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("id", &self.id)
            .field("size", &(self.size.w, self.size.h))
            .finish()
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        let Some(renderer) = self.renderer.upgrade() else {
            return;
        };
        match renderer.try_borrow_mut() {
            Ok(mut renderer) => renderer.release_buffer(self.id),
            Err(_) => tracing::error!(buffer = ?self.id, "renderer busy, leaking buffer"),
        };
    }
}

/// Owned depth attachment, released when dropped.
pub struct DepthAttachment {
    id: DepthId,
    size: Size<i32, Physical>,
    renderer: Weak<RefCell<dyn RenderBackend>>,
}

impl DepthAttachment {
    pub fn allocate(renderer: &SharedRenderer, size: Size<i32, Physical>) -> Result<Self> {
        let id = renderer.borrow_mut().create_depth(size)?;
        Ok(Self {
            id,
            size,
            renderer: Rc::downgrade(renderer),
        })
    }

    pub fn id(&self) -> DepthId {
        self.id
    }

    pub fn size(&self) -> Size<i32, Physical> {
        self.size
    }
}

impl std::fmt::Debug for DepthAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepthAttachment")
            .field("id", &self.id)
            .field("size", &(self.size.w, self.size.h))
            .finish()
    }
}

impl Drop for DepthAttachment {
    fn drop(&mut self) {
        let Some(renderer) = self.renderer.upgrade() else {
            return;
        };
        match renderer.try_borrow_mut() {
            Ok(mut renderer) => renderer.release_depth(self.id),
            Err(_) => tracing::error!(depth = ?self.id, "renderer busy, leaking depth attachment"),
        };
    }
}

/// Result of asking the display for a buffer to render the next frame into.
#[derive(Debug, Clone)]
pub struct FrameStart {
    pub buffer: BufferId,
    pub size: Size<i32, Physical>,
    /// Whether anything changed since the last presented frame.
    pub needs_swap: bool,
    /// Damage the returned buffer needs, in output orientation.
    pub buffer_damage: Region<Physical>,
}

/// Per-output presentation interface.
pub trait DisplayBackend {
    fn name(&self) -> String;
    fn mode_size(&self) -> Size<i32, Physical>;
    fn refresh_interval(&self) -> Duration;

    /// Forward damage (output orientation, device pixels) to the display's own tracker.
    fn add_damage(&mut self, damage: &Region<Physical>);
    fn begin_frame(&mut self) -> Result<FrameStart>;
    /// Abandon the frame opened by `begin_frame` without presenting it.
    fn rollback(&mut self);
    fn commit(&mut self, damage: &Region<Buffer>) -> Result<()>;
    /// Present a client buffer directly. Returns false if the display refused it.
    fn attach_scanout(&mut self, buffer: BufferId) -> bool;

    fn software_cursor_locks(&self) -> u32;
    fn hardware_cursor(&self) -> bool;
}

/// Lets the host keep a handle on a display it gave to a render manager.
impl<T: DisplayBackend + ?Sized> DisplayBackend for Rc<RefCell<T>> {
    fn name(&self) -> String {
        self.borrow().name()
    }

    fn mode_size(&self) -> Size<i32, Physical> {
        self.borrow().mode_size()
    }

    fn refresh_interval(&self) -> Duration {
        self.borrow().refresh_interval()
    }

    fn add_damage(&mut self, damage: &Region<Physical>) {
        self.borrow_mut().add_damage(damage)
    }

    fn begin_frame(&mut self) -> Result<FrameStart> {
        self.borrow_mut().begin_frame()
    }

    fn rollback(&mut self) {
        self.borrow_mut().rollback()
    }

    fn commit(&mut self, damage: &Region<Buffer>) -> Result<()> {
        self.borrow_mut().commit(damage)
    }

    fn attach_scanout(&mut self, buffer: BufferId) -> bool {
        self.borrow_mut().attach_scanout(buffer)
    }

    fn software_cursor_locks(&self) -> u32 {
        self.borrow().software_cursor_locks()
    }

    fn hardware_cursor(&self) -> bool {
        self.borrow().hardware_cursor()
    }
}
