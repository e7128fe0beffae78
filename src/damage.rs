//! Per-output damage bookkeeping.
//!
//! `frame_damage` holds everything damaged since the last submitted frame, in
//! device pixels and output orientation. `acc_damage` is what the display
//! reports its current back buffer is missing; it is folded into
//! `frame_damage` once a frame is really going to be rendered. Damage added
//! while a frame is open waits in `deferred_damage` for the next one.

use smithay::utils::{Logical, Physical, Rectangle, Size, Transform};

use crate::{
    backend::{BufferId, DisplayBackend, FrameStart},
    errors::{RenderError, Result},
    region::Region,
};

pub struct DamageTracker {
    display: Box<dyn DisplayBackend>,
    scale: f64,
    transform: Transform,
    disable_damage_tracking: bool,
    frame_damage: Region<Physical>,
    acc_damage: Region<Physical>,
    deferred_damage: Region<Physical>,
    frame: Option<FrameStart>,
}

impl DamageTracker {
    pub fn new(display: Box<dyn DisplayBackend>, scale: f64, transform: Transform) -> Self {
        Self {
            display,
            scale,
            transform,
            disable_damage_tracking: false,
            frame_damage: Region::new(),
            acc_damage: Region::new(),
            deferred_damage: Region::new(),
            frame: None,
        }
    }

    pub fn display(&self) -> &dyn DisplayBackend {
        self.display.as_ref()
    }

    pub fn display_mut(&mut self) -> &mut dyn DisplayBackend {
        self.display.as_mut()
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn set_scale(&mut self, scale: f64) {
        if scale > 0.0 && scale != self.scale {
            self.scale = scale;
            self.damage_whole();
        }
    }

    pub fn set_transform(&mut self, transform: Transform) {
        if transform != self.transform {
            self.transform = transform;
            self.damage_whole();
        }
    }

    pub fn set_disable_damage_tracking(&mut self, disabled: bool) {
        self.disable_damage_tracking = disabled;
    }

    /// Mode size of the display, in buffer orientation.
    pub fn mode_size(&self) -> Size<i32, Physical> {
        self.display.mode_size()
    }

    /// Device pixels in output orientation.
    pub fn output_size(&self) -> Size<i32, Physical> {
        self.transform.transform_size(self.display.mode_size())
    }

    pub fn logical_size(&self) -> Size<i32, Logical> {
        let size = self.output_size();
        Size::from((
            (size.w as f64 / self.scale).round() as i32,
            (size.h as f64 / self.scale).round() as i32,
        ))
    }

    /// The output in its own logical coordinates.
    pub fn output_box(&self) -> Rectangle<i32, Logical> {
        Rectangle::from_size(self.logical_size())
    }

    pub fn damage(&mut self, region: &Region<Logical>) {
        if region.is_empty() {
            return;
        }
        let physical = region.to_physical(self.scale);
        if self.frame.is_some() {
            self.deferred_damage.union(&physical);
        } else {
            self.frame_damage.union(&physical);
        }
        self.display.add_damage(&physical);
    }

    pub fn damage_box(&mut self, rect: Rectangle<i32, Logical>) {
        self.damage(&Region::from_rect(rect));
    }

    pub fn damage_whole(&mut self) {
        self.damage_box(self.output_box());
    }

    /// Damage of the coming (or open) frame, in output-local logical coordinates.
    pub fn get_scheduled_damage(&self) -> Region<Logical> {
        self.frame_damage.to_logical(self.scale)
    }

    /// Ask the display for the buffer of the next frame.
    ///
    /// Returns whether anything changed since the last presented frame. On
    /// error no frame is open.
    pub fn make_current(&mut self) -> Result<bool> {
        if self.frame.is_some() {
            self.rollback();
        }
        let frame = self.display.begin_frame()?;
        let needs_swap = frame.needs_swap;
        self.acc_damage = frame.buffer_damage.clone();
        self.frame = Some(frame);
        Ok(needs_swap)
    }

    pub fn frame(&self) -> Option<&FrameStart> {
        self.frame.as_ref()
    }

    /// The display buffer the open frame renders into.
    pub fn frame_buffer(&self) -> Option<BufferId> {
        self.frame.as_ref().map(|frame| frame.buffer)
    }

    pub fn accumulate_damage(&mut self) {
        self.frame_damage.union(&self.acc_damage);
        if self.disable_damage_tracking {
            self.frame_damage
                .add_rect(Rectangle::from_size(self.output_size()));
        }
    }

    /// Give the open frame back to the display; its damage stays scheduled.
    pub fn rollback(&mut self) {
        if self.frame.take().is_some() {
            self.display.rollback();
        }
        self.acc_damage.clear();
        let deferred = std::mem::take(&mut self.deferred_damage);
        self.frame_damage.union(&deferred);
    }

    /// Submit the open frame with everything damaged so far.
    pub fn swap_buffers(&mut self) -> Result<()> {
        if self.frame.is_none() {
            return Err(RenderError::Backend("swap without an open frame".into()));
        }
        let extent = Rectangle::from_size(self.output_size());
        let damage = self
            .frame_damage
            .intersect_rect(extent)
            .to_buffer(self.transform, self.output_size());
        self.display.commit(&damage)?;

        self.frame = None;
        self.frame_damage = std::mem::take(&mut self.deferred_damage);
        self.acc_damage.clear();
        Ok(())
    }

    /// A client buffer went to the screen directly. The next composited
    /// frame repaints from the display's own damage.
    pub fn scanout_presented(&mut self) {
        self.frame_damage.clear();
        self.acc_damage.clear();
    }
}
