//! CPU rendering backend.
//!
//! Buffers are plain ARGB8888 pixel arrays. Textures are sampled with nearest
//! neighbour filtering and blended with straight alpha.

use std::collections::HashMap;

use smithay::utils::{Physical, Rectangle, Size};

use super::{BufferId, Color, DepthId, RenderBackend, RenderTarget};
use crate::errors::{RenderError, Result};

struct PixelBuffer {
    size: Size<i32, Physical>,
    pixels: Vec<u32>,
    depth: Option<DepthId>,
}

impl PixelBuffer {
    fn new(size: Size<i32, Physical>) -> Self {
        Self {
            size,
            pixels: vec![0; (size.w.max(0) * size.h.max(0)) as usize],
            depth: None,
        }
    }

    fn bounds(&self) -> Rectangle<i32, Physical> {
        Rectangle::from_size(self.size)
    }
}

#[derive(Default)]
pub struct SoftwareRenderer {
    next_id: u64,
    buffers: HashMap<BufferId, PixelBuffer>,
    depths: HashMap<DepthId, Vec<f32>>,
    bound: Option<RenderTarget>,
    draw_calls: u64,
}

fn check_size(size: Size<i32, Physical>) -> Result<()> {
    if size.w <= 0 || size.h <= 0 {
        return Err(RenderError::Allocation(format!(
            "invalid buffer size {}x{}",
            size.w, size.h
        )));
    }
    Ok(())
}

fn blend(dst: u32, src: Color) -> u32 {
    if src.is_opaque() {
        return src.to_argb8888();
    }
    let under = Color::from_argb8888(dst);
    let a = src.a.clamp(0.0, 1.0);
    Color::new(
        src.r * a + under.r * (1.0 - a),
        src.g * a + under.g * (1.0 - a),
        src.b * a + under.b * (1.0 - a),
        a + under.a * (1.0 - a),
    )
    .to_argb8888()
}

/// Visit every pixel of `dst` that falls inside one of the `damage` rects and the buffer.
fn for_each_damaged_pixel(
    bounds: Rectangle<i32, Physical>,
    dst: Rectangle<i32, Physical>,
    damage: &[Rectangle<i32, Physical>],
    mut f: impl FnMut(i32, i32),
) {
    let Some(dst) = dst.intersection(bounds) else {
        return;
    };
    for rect in damage {
        let Some(clip) = rect.intersection(dst) else {
            continue;
        };
        for y in clip.loc.y..clip.loc.y + clip.size.h {
            for x in clip.loc.x..clip.loc.x + clip.size.w {
                f(x, y);
            }
        }
    }
}

impl SoftwareRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn bound_buffer(&self) -> Result<BufferId> {
        self.bound
            .as_ref()
            .map(|target| target.buffer)
            .ok_or(RenderError::NotBound)
    }

    pub fn pixels(&self, buffer: BufferId) -> Option<&[u32]> {
        self.buffers.get(&buffer).map(|b| b.pixels.as_slice())
    }

    pub fn as_bytes(&self, buffer: BufferId) -> Option<&[u8]> {
        self.pixels(buffer).map(bytemuck::cast_slice)
    }

    pub fn pixel(&self, buffer: BufferId, x: i32, y: i32) -> Option<u32> {
        let b = self.buffers.get(&buffer)?;
        if x < 0 || y < 0 || x >= b.size.w || y >= b.size.h {
            return None;
        }
        b.pixels.get((y * b.size.w + x) as usize).copied()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_depths(&self) -> usize {
        self.depths.len()
    }

    pub fn depth_of(&self, buffer: BufferId) -> Option<DepthId> {
        self.buffers.get(&buffer).and_then(|b| b.depth)
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }
}

impl RenderBackend for SoftwareRenderer {
    fn name(&self) -> &str {
        "software"
    }

    fn create_buffer(&mut self, size: Size<i32, Physical>) -> Result<BufferId> {
        check_size(size)?;
        let id = BufferId(self.next_id());
        self.buffers.insert(id, PixelBuffer::new(size));
        Ok(id)
    }

    fn resize_buffer(&mut self, buffer: BufferId, size: Size<i32, Physical>) -> Result<()> {
        check_size(size)?;
        let entry = self
            .buffers
            .get_mut(&buffer)
            .ok_or(RenderError::UnknownBuffer(buffer))?;
        if entry.size != size {
            let depth = entry.depth;
            *entry = PixelBuffer::new(size);
            entry.depth = depth;
        }
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(&buffer).is_none() {
            tracing::warn!(?buffer, "release of unknown buffer");
        }
    }

    fn buffer_size(&self, buffer: BufferId) -> Option<Size<i32, Physical>> {
        self.buffers.get(&buffer).map(|b| b.size)
    }

    fn import_pixels(&mut self, size: Size<i32, Physical>, pixels: &[u32]) -> Result<BufferId> {
        check_size(size)?;
        let expected = (size.w * size.h) as usize;
        if pixels.len() != expected {
            return Err(RenderError::Allocation(format!(
                "pixel data has {} entries, expected {expected}",
                pixels.len()
            )));
        }
        let id = BufferId(self.next_id());
        let mut buffer = PixelBuffer::new(size);
        buffer.pixels.copy_from_slice(pixels);
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn create_depth(&mut self, size: Size<i32, Physical>) -> Result<DepthId> {
        check_size(size)?;
        let id = DepthId(self.next_id());
        self.depths
            .insert(id, vec![1.0; (size.w * size.h) as usize]);
        Ok(id)
    }

    fn release_depth(&mut self, depth: DepthId) {
        self.depths.remove(&depth);
        for buffer in self.buffers.values_mut() {
            if buffer.depth == Some(depth) {
                buffer.depth = None;
            }
        }
    }

    fn attach_depth(&mut self, buffer: BufferId, depth: DepthId) -> Result<()> {
        if !self.depths.contains_key(&depth) {
            return Err(RenderError::Backend(format!("unknown depth attachment {depth:?}")));
        }
        let entry = self
            .buffers
            .get_mut(&buffer)
            .ok_or(RenderError::UnknownBuffer(buffer))?;
        entry.depth = Some(depth);
        Ok(())
    }

    fn begin(&mut self, target: &RenderTarget) -> Result<()> {
        if let Some(bound) = &self.bound {
            return Err(RenderError::Backend(format!(
                "drawing scope for {:?} still open",
                bound.buffer
            )));
        }
        if !self.buffers.contains_key(&target.buffer) {
            return Err(RenderError::UnknownBuffer(target.buffer));
        }
        self.bound = Some(target.clone());
        Ok(())
    }

    fn end(&mut self) {
        self.bound = None;
    }

    fn clear(&mut self, color: Color, damage: &[Rectangle<i32, Physical>]) -> Result<()> {
        let id = self.bound_buffer()?;
        let buffer = self
            .buffers
            .get_mut(&id)
            .ok_or(RenderError::UnknownBuffer(id))?;
        let pixel = color.to_argb8888();
        let (bounds, width) = (buffer.bounds(), buffer.size.w);
        for_each_damaged_pixel(bounds, bounds, damage, |x, y| {
            buffer.pixels[(y * width + x) as usize] = pixel;
        });
        self.draw_calls += 1;
        Ok(())
    }

    fn draw_texture(
        &mut self,
        texture: BufferId,
        dst: Rectangle<i32, Physical>,
        damage: &[Rectangle<i32, Physical>],
        alpha: f32,
    ) -> Result<()> {
        let id = self.bound_buffer()?;
        if id == texture {
            return Err(RenderError::Backend("cannot sample the bound target".into()));
        }
        if dst.size.w <= 0 || dst.size.h <= 0 {
            return Ok(());
        }
        // Take the target out of the map so the source can be borrowed alongside it.
        let mut target = self
            .buffers
            .remove(&id)
            .ok_or(RenderError::UnknownBuffer(id))?;
        let result = match self.buffers.get(&texture) {
            Some(source) => {
                let (bounds, width) = (target.bounds(), target.size.w);
                for_each_damaged_pixel(bounds, dst, damage, |x, y| {
                    let sx = ((x - dst.loc.x) as i64 * source.size.w as i64 / dst.size.w as i64) as i32;
                    let sy = ((y - dst.loc.y) as i64 * source.size.h as i64 / dst.size.h as i64) as i32;
                    let texel = source.pixels[(sy * source.size.w + sx) as usize];
                    let idx = (y * width + x) as usize;
                    target.pixels[idx] =
                        blend(target.pixels[idx], Color::from_argb8888(texel).with_alpha(alpha));
                });
                Ok(())
            }
            None => Err(RenderError::UnknownBuffer(texture)),
        };
        self.buffers.insert(id, target);
        self.draw_calls += 1;
        result
    }

    fn draw_rect(
        &mut self,
        color: Color,
        dst: Rectangle<i32, Physical>,
        damage: &[Rectangle<i32, Physical>],
    ) -> Result<()> {
        let id = self.bound_buffer()?;
        let buffer = self
            .buffers
            .get_mut(&id)
            .ok_or(RenderError::UnknownBuffer(id))?;
        let (bounds, width) = (buffer.bounds(), buffer.size.w);
        for_each_damaged_pixel(bounds, dst, damage, |x, y| {
            let idx = (y * width + x) as usize;
            buffer.pixels[idx] = blend(buffer.pixels[idx], color);
        });
        self.draw_calls += 1;
        Ok(())
    }

    fn is_at_rest(&self) -> bool {
        self.bound.is_none()
    }
}

#[cfg(test)]
mod tests {
    use smithay::utils::Transform;

    use super::*;

    fn target(renderer: &mut SoftwareRenderer, w: i32, h: i32) -> RenderTarget {
        let size = Size::from((w, h));
        let buffer = renderer.create_buffer(size).unwrap();
        RenderTarget::new(buffer, size, 1.0, Transform::Normal, true)
    }

    #[test]
    fn clear_only_touches_damage() {
        let mut renderer = SoftwareRenderer::new();
        let target = target(&mut renderer, 8, 8);
        renderer.begin(&target).unwrap();
        renderer
            .clear(Color::BLACK, &[Rectangle::new((0, 0).into(), (4, 8).into())])
            .unwrap();
        renderer.end();

        assert_eq!(renderer.pixel(target.buffer, 1, 1), Some(0xff00_0000));
        assert_eq!(renderer.pixel(target.buffer, 6, 1), Some(0));
        assert!(renderer.is_at_rest());
    }

    #[test]
    fn drawing_requires_a_bound_target() {
        let mut renderer = SoftwareRenderer::new();
        let err = renderer.clear(Color::BLACK, &[]).unwrap_err();
        assert!(matches!(err, RenderError::NotBound));
    }

    #[test]
    fn texture_is_scaled_into_destination() {
        let mut renderer = SoftwareRenderer::new();
        let texture = renderer
            .import_pixels(Size::from((1, 1)), &[0xffff_0000])
            .unwrap();
        let target = target(&mut renderer, 4, 4);
        let full = Rectangle::from_size(Size::from((4, 4)));
        renderer.begin(&target).unwrap();
        renderer.draw_texture(texture, full, &[full], 1.0).unwrap();
        renderer.end();

        assert_eq!(renderer.pixel(target.buffer, 3, 3), Some(0xffff_0000));
        assert_eq!(renderer.as_bytes(target.buffer).map(|b| b.len()), Some(4 * 4 * 4));
    }

    #[test]
    fn translucent_rect_blends() {
        let mut renderer = SoftwareRenderer::new();
        let target = target(&mut renderer, 2, 2);
        let full = Rectangle::from_size(Size::from((2, 2)));
        renderer.begin(&target).unwrap();
        renderer.clear(Color::new(0.0, 0.0, 1.0, 1.0), &[full]).unwrap();
        renderer
            .draw_rect(Color::new(1.0, 0.0, 0.0, 0.5), full, &[full])
            .unwrap();
        renderer.end();

        let pixel = Color::from_argb8888(renderer.pixel(target.buffer, 0, 0).unwrap());
        assert!((pixel.r - 0.5).abs() < 0.01);
        assert!((pixel.b - 0.5).abs() < 0.01);
    }

    #[test]
    fn nested_scopes_are_rejected() {
        let mut renderer = SoftwareRenderer::new();
        let target = target(&mut renderer, 2, 2);
        renderer.begin(&target).unwrap();
        assert!(renderer.begin(&target).is_err());
        renderer.end();
    }
}
