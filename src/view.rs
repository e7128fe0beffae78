//! Minimal view model the renderer composites.
//!
//! Views live in a [`ViewArena`] and are referred to by generational ids, so a
//! stale id simply stops resolving once its view is gone.

use std::time::Duration;

use bitflags::bitflags;
use smithay::utils::{Logical, Point, Rectangle, Size};

use crate::{
    backend::{BufferId, Color, RenderBackend, RenderTarget},
    errors::Result,
    region::Region,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    Background,
    Bottom,
    Workspace,
    Top,
    Overlay,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LayerMask: u32 {
        const BACKGROUND = 1 << 0;
        const BOTTOM = 1 << 1;
        const WORKSPACE = 1 << 2;
        const TOP = 1 << 3;
        const OVERLAY = 1 << 4;
    }
}

impl Layer {
    /// Topmost first.
    pub const STACKING: [Layer; 5] = [
        Layer::Overlay,
        Layer::Top,
        Layer::Workspace,
        Layer::Bottom,
        Layer::Background,
    ];

    pub fn mask(self) -> LayerMask {
        match self {
            Layer::Background => LayerMask::BACKGROUND,
            Layer::Bottom => LayerMask::BOTTOM,
            Layer::Workspace => LayerMask::WORKSPACE,
            Layer::Top => LayerMask::TOP,
            Layer::Overlay => LayerMask::OVERLAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceContent {
    Solid(Color),
    Buffer(BufferId),
}

#[derive(Debug, Clone)]
pub struct Surface {
    /// Position relative to the view origin.
    pub offset: Point<i32, Logical>,
    pub size: Size<i32, Logical>,
    /// Relative to the surface origin.
    pub opaque: Region<Logical>,
    pub content: SurfaceContent,
    pub buffer_scale: i32,
}

impl Surface {
    /// A single-color surface; opaque if the color is.
    pub fn solid(size: impl Into<Size<i32, Logical>>, color: Color) -> Self {
        let size = size.into();
        let opaque = if color.is_opaque() {
            Region::from_rect(Rectangle::from_size(size))
        } else {
            Region::new()
        };
        Self {
            offset: Point::from((0, 0)),
            size,
            opaque,
            content: SurfaceContent::Solid(color),
            buffer_scale: 1,
        }
    }

    /// A client buffer. The opaque region starts empty.
    pub fn buffer(size: impl Into<Size<i32, Logical>>, buffer: BufferId, buffer_scale: i32) -> Self {
        Self {
            offset: Point::from((0, 0)),
            size: size.into(),
            opaque: Region::new(),
            content: SurfaceContent::Buffer(buffer),
            buffer_scale,
        }
    }

    pub fn with_offset(mut self, offset: impl Into<Point<i32, Logical>>) -> Self {
        self.offset = offset.into();
        self
    }

    pub fn with_opaque(mut self, opaque: Region<Logical>) -> Self {
        self.opaque = opaque;
        self
    }

    pub fn fully_opaque(self) -> Self {
        let whole = Region::from_rect(Rectangle::from_size(self.size));
        self.with_opaque(whole)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub alpha: f32,
    /// Uniform scale around the view center.
    pub scale: f64,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct View {
    /// Top-left corner in workspace coordinates.
    pub position: Point<i32, Logical>,
    pub surface: Surface,
    /// Drawn above the main surface, last one on top.
    pub children: Vec<Surface>,
    pub mapped: bool,
    /// Unmapped but still on screen, e.g. while a close animation runs.
    pub snapshotted: bool,
    pub transform: Option<ViewTransform>,
    pub layer: Layer,
    frame_done_count: u64,
    last_frame_done: Option<Duration>,
}

impl View {
    pub fn new(position: impl Into<Point<i32, Logical>>, surface: Surface) -> Self {
        Self {
            position: position.into(),
            surface,
            children: Vec::new(),
            mapped: true,
            snapshotted: false,
            transform: None,
            layer: Layer::Workspace,
            frame_done_count: 0,
            last_frame_done: None,
        }
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_child(mut self, child: Surface) -> Self {
        self.children.push(child);
        self
    }

    /// Main surface box in workspace coordinates.
    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        Rectangle::new(self.position + self.surface.offset, self.surface.size)
    }

    pub fn is_visible(&self) -> bool {
        self.mapped || self.snapshotted
    }

    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    /// Surfaces with their untransformed boxes, topmost first.
    pub fn surfaces(&self) -> impl Iterator<Item = (Rectangle<i32, Logical>, &Surface)> {
        self.children
            .iter()
            .rev()
            .chain(std::iter::once(&self.surface))
            .map(move |surface| (Rectangle::new(self.position + surface.offset, surface.size), surface))
    }

    fn untransformed_box(&self) -> Rectangle<i32, Logical> {
        self.surfaces()
            .map(|(rect, _)| rect)
            .reduce(|acc, rect| acc.merge(rect))
            .unwrap_or_else(|| self.geometry())
    }

    /// Apply the view transform to a rect in workspace coordinates.
    fn transform_rect(&self, rect: Rectangle<i32, Logical>) -> Rectangle<i32, Logical> {
        let Some(transform) = self.transform else {
            return rect;
        };
        if transform.scale == 1.0 {
            return rect;
        }
        let center = self.untransformed_box();
        let (cx, cy) = (
            center.loc.x as f64 + center.size.w as f64 / 2.0,
            center.loc.y as f64 + center.size.h as f64 / 2.0,
        );
        let x = cx + (rect.loc.x as f64 - cx) * transform.scale;
        let y = cy + (rect.loc.y as f64 - cy) * transform.scale;
        let w = rect.size.w as f64 * transform.scale;
        let h = rect.size.h as f64 * transform.scale;
        let x0 = x.floor() as i32;
        let y0 = y.floor() as i32;
        Rectangle::new(
            Point::from((x0, y0)),
            Size::from(((x + w).ceil() as i32 - x0, (y + h).ceil() as i32 - y0)),
        )
    }

    /// Everything the view may draw to, in workspace coordinates.
    pub fn bounding_box(&self) -> Rectangle<i32, Logical> {
        self.transform_rect(self.untransformed_box())
    }

    /// Pixels the view fully covers, in workspace coordinates.
    pub fn opaque_region(&self) -> Region<Logical> {
        if self.transform.is_some() {
            return Region::new();
        }
        let mut region = Region::new();
        for (rect, surface) in self.surfaces() {
            region.union(&surface.opaque.translated(rect.loc).intersect_rect(rect));
        }
        region
    }

    /// Draw one surface, without the view transform.
    pub fn render_surface(
        &self,
        renderer: &mut dyn RenderBackend,
        target: &RenderTarget,
        rect: Rectangle<i32, Logical>,
        surface: &Surface,
        damage: &Region<Logical>,
    ) -> Result<()> {
        draw_surface(renderer, target, rect, surface, damage, 1.0)
    }

    /// Draw every surface with the view transform applied.
    pub fn render_transformed(
        &self,
        renderer: &mut dyn RenderBackend,
        target: &RenderTarget,
        damage: &Region<Logical>,
    ) -> Result<()> {
        let alpha = self.transform.map_or(1.0, |transform| transform.alpha);
        let surfaces: Vec<_> = self.surfaces().collect();
        for (rect, surface) in surfaces.into_iter().rev() {
            let rect = self.transform_rect(rect);
            draw_surface(renderer, target, rect, surface, damage, alpha)?;
        }
        Ok(())
    }

    pub fn send_frame_done(&mut self, time: Duration) {
        self.frame_done_count += 1;
        self.last_frame_done = Some(time);
    }

    pub fn frame_done_count(&self) -> u64 {
        self.frame_done_count
    }

    pub fn last_frame_done(&self) -> Option<Duration> {
        self.last_frame_done
    }
}

fn draw_surface(
    renderer: &mut dyn RenderBackend,
    target: &RenderTarget,
    rect: Rectangle<i32, Logical>,
    surface: &Surface,
    damage: &Region<Logical>,
    alpha: f32,
) -> Result<()> {
    let clipped = damage.intersect_rect(rect);
    if clipped.is_empty() {
        return Ok(());
    }
    let dst = target.framebuffer_box(rect);
    let damage = target.framebuffer_region(&clipped);
    match surface.content {
        SurfaceContent::Solid(color) => renderer.draw_rect(color.with_alpha(alpha), dst, &damage),
        SurfaceContent::Buffer(buffer) => renderer.draw_texture(buffer, dst, &damage, alpha),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    view: Option<View>,
}

#[derive(Debug, Default)]
pub struct ViewArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl ViewArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, view: View) -> ViewId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.view = Some(view);
            return ViewId {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            view: Some(view),
        });
        ViewId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    pub fn remove(&mut self, id: ViewId) -> Option<View> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let view = slot.view.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(view)
    }

    pub fn get(&self, id: ViewId) -> Option<&View> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.view.as_ref()
    }

    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut View> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.view.as_mut()
    }

    pub fn contains(&self, id: ViewId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.view.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
