//! Compositing one workspace into a buffer.
//!
//! Views are walked topmost first. Each one claims the part of the damage it
//! covers and removes its opaque region from what is left, so anything fully
//! hidden behind opaque content is never drawn. Whatever no opaque surface
//! covered is cleared to the background, then the claimed pieces are drawn
//! bottom to top.

use smithay::utils::{Logical, Physical, Rectangle, Size, Transform};

use crate::{
    backend::{Color, GpuBuffer, RenderBackend, RenderTarget, SharedRenderer},
    errors::{RenderError, Result},
    region::Region,
    scene::{Scene, Workspace},
    view::{LayerMask, ViewId},
};

#[derive(Debug)]
pub struct WorkspaceStream {
    pub ws: Workspace,
    buffer: Option<GpuBuffer>,
    running: bool,
    pub scale_x: f64,
    pub scale_y: f64,
    pub background: Color,
    /// Views drawn by the last update, topmost first.
    rendered: Vec<ViewId>,
}

#[derive(Debug, Clone, Copy)]
enum Piece {
    /// The whole view with its transform, as one unit.
    Snapshot,
    /// One surface of an untransformed view.
    Surface(usize),
}

#[derive(Debug)]
struct QueuedItem {
    view: ViewId,
    piece: Piece,
    damage: Region<Logical>,
}

impl WorkspaceStream {
    pub fn new(ws: Workspace, background: Color) -> Self {
        Self {
            ws,
            buffer: None,
            running: false,
            scale_x: 1.0,
            scale_y: 1.0,
            background,
            rendered: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
        if running {
            self.scale_x = 1.0;
            self.scale_y = 1.0;
        }
    }

    pub fn buffer(&self) -> Option<&GpuBuffer> {
        self.buffer.as_ref()
    }

    pub fn rendered_views(&self) -> &[ViewId] {
        &self.rendered
    }

    /// The stream's own buffer at output resolution, as a render target.
    pub(crate) fn own_target(
        &mut self,
        renderer: &SharedRenderer,
        size: Size<i32, Physical>,
        scale: f64,
        transform: Transform,
    ) -> Result<RenderTarget> {
        match &mut self.buffer {
            Some(buffer) => buffer.ensure_size(size)?,
            None => self.buffer = Some(GpuBuffer::allocate(renderer, size)?),
        }
        let buffer = self
            .buffer
            .as_ref()
            .ok_or_else(|| RenderError::Allocation("workspace stream buffer".into()))?;
        let y_flip = renderer.borrow().offscreen_y_inverted();
        Ok(RenderTarget::new(buffer.id(), size, scale, transform, false).with_y_flip(y_flip))
    }

    /// Composite the workspace into `target`. `damage` is workspace-local.
    pub(crate) fn render(
        &mut self,
        scene: &Scene,
        renderer: &SharedRenderer,
        target: &RenderTarget,
        damage: &Region<Logical>,
        with_drag_icons: bool,
    ) -> Result<()> {
        let (queue, remaining) = self.build_queue(scene, damage, with_drag_icons);

        let mut renderer = renderer.borrow_mut();
        renderer.begin(target)?;
        let result = self.draw(scene, &mut *renderer, target, &queue, &remaining);
        renderer.end();
        result
    }

    fn build_queue(
        &mut self,
        scene: &Scene,
        damage: &Region<Logical>,
        with_drag_icons: bool,
    ) -> (Vec<QueuedItem>, Region<Logical>) {
        let mut remaining = damage.clone();
        let mut queue = Vec::new();
        self.rendered.clear();

        let drag_icons: &[ViewId] = if with_drag_icons {
            scene.drag_icons()
        } else {
            &[]
        };
        let candidates = drag_icons
            .iter()
            .copied()
            .chain(scene.views_on_workspace(self.ws, LayerMask::all()));

        for id in candidates {
            if remaining.is_empty() {
                break;
            }
            let Some(view) = scene.view(id) else {
                continue;
            };
            if !view.is_visible() {
                continue;
            }
            let view_damage = remaining.intersect_rect(view.bounding_box());
            if view_damage.is_empty() {
                continue;
            }
            self.rendered.push(id);

            if view.has_transform() || !view.mapped {
                queue.push(QueuedItem {
                    view: id,
                    piece: Piece::Snapshot,
                    damage: view_damage,
                });
                continue;
            }

            for (index, (rect, surface)) in view.surfaces().enumerate() {
                let surface_damage = remaining.intersect_rect(rect);
                if surface_damage.is_empty() {
                    continue;
                }
                queue.push(QueuedItem {
                    view: id,
                    piece: Piece::Surface(index),
                    damage: surface_damage,
                });
                remaining.subtract(&surface.opaque.translated(rect.loc).intersect_rect(rect));
            }
        }

        (queue, remaining)
    }

    fn draw(
        &self,
        scene: &Scene,
        renderer: &mut dyn RenderBackend,
        target: &RenderTarget,
        queue: &[QueuedItem],
        remaining: &Region<Logical>,
    ) -> Result<()> {
        if !remaining.is_empty() {
            renderer.clear(self.background, &target.framebuffer_region(remaining))?;
        }

        for item in queue.iter().rev() {
            let Some(view) = scene.view(item.view) else {
                continue;
            };
            match item.piece {
                Piece::Snapshot => view.render_transformed(renderer, target, &item.damage)?,
                Piece::Surface(index) => {
                    if let Some((rect, surface)) = view.surfaces().nth(index) {
                        view.render_surface(renderer, target, rect, surface, &item.damage)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Screen-space box of `ws` when `current` is shown on an output of `size`.
pub fn workspace_box(
    ws: Workspace,
    current: Workspace,
    size: Size<i32, Logical>,
) -> Rectangle<i32, Logical> {
    Rectangle::new(
        ((ws.x - current.x) * size.w, (ws.y - current.y) * size.h).into(),
        size,
    )
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        backend::SoftwareRenderer,
        view::{Surface, View, ViewTransform},
    };

    const RED: Color = Color::new(1.0, 0.0, 0.0, 1.0);
    const BLUE: Color = Color::new(0.0, 0.0, 1.0, 1.0);

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
        Rectangle::new((x, y).into(), (w, h).into())
    }

    struct Fixture {
        software: Rc<RefCell<SoftwareRenderer>>,
        renderer: SharedRenderer,
        _buffer: GpuBuffer,
        target: RenderTarget,
    }

    fn fixture() -> Fixture {
        let software = Rc::new(RefCell::new(SoftwareRenderer::new()));
        let renderer: SharedRenderer = software.clone();
        let buffer = GpuBuffer::allocate(&renderer, Size::from((100, 100))).unwrap();
        let target = RenderTarget::new(buffer.id(), buffer.size(), 1.0, Transform::Normal, true);
        Fixture {
            software,
            renderer,
            _buffer: buffer,
            target,
        }
    }

    #[test]
    fn occluded_view_is_not_queued() {
        let fx = fixture();
        let mut scene = Scene::new();
        let ws = Workspace::new(0, 0);
        let below = scene.add_view(ws, View::new((10, 10), Surface::solid((20, 20), BLUE)));
        let above = scene.add_view(ws, View::new((0, 0), Surface::solid((100, 100), RED)));

        let mut stream = WorkspaceStream::new(ws, Color::BLACK);
        stream
            .render(&scene, &fx.renderer, &fx.target, &Region::from_rect(rect(0, 0, 100, 100)), false)
            .unwrap();

        assert_eq!(stream.rendered_views(), &[above]);
        assert!(!stream.rendered_views().contains(&below));
        let pixel = fx.software.borrow().pixel(fx.target.buffer, 15, 15).unwrap();
        assert_eq!(pixel, RED.to_argb8888());
    }

    #[test]
    fn translucent_view_shows_what_is_below() {
        let fx = fixture();
        let mut scene = Scene::new();
        let ws = Workspace::new(0, 0);
        let below = scene.add_view(ws, View::new((0, 0), Surface::solid((100, 100), BLUE)));
        let above = scene.add_view(
            ws,
            View::new((0, 0), Surface::solid((50, 50), Color::new(1.0, 0.0, 0.0, 0.5))),
        );

        let mut stream = WorkspaceStream::new(ws, Color::BLACK);
        stream
            .render(&scene, &fx.renderer, &fx.target, &Region::from_rect(rect(0, 0, 100, 100)), false)
            .unwrap();

        assert_eq!(stream.rendered_views(), &[above, below]);
        let pixel = Color::from_argb8888(fx.software.borrow().pixel(fx.target.buffer, 10, 10).unwrap());
        assert!(pixel.r > 0.4 && pixel.b > 0.4);
    }

    #[test]
    fn uncovered_damage_is_cleared_to_background() {
        let fx = fixture();
        let scene = Scene::new();
        let mut stream = WorkspaceStream::new(Workspace::new(0, 0), BLUE);
        stream
            .render(&scene, &fx.renderer, &fx.target, &Region::from_rect(rect(0, 0, 10, 10)), false)
            .unwrap();

        let software = fx.software.borrow();
        assert_eq!(software.pixel(fx.target.buffer, 5, 5), Some(BLUE.to_argb8888()));
        assert_eq!(software.pixel(fx.target.buffer, 50, 50), Some(0));
        assert!(software.is_at_rest());
    }

    #[test]
    fn transformed_view_never_occludes() {
        let fx = fixture();
        let mut scene = Scene::new();
        let ws = Workspace::new(0, 0);
        let below = scene.add_view(ws, View::new((0, 0), Surface::solid((100, 100), BLUE)));
        let above = scene.add_view(ws, View::new((0, 0), Surface::solid((100, 100), RED)));
        if let Some(view) = scene.view_mut(above) {
            view.transform = Some(ViewTransform {
                alpha: 0.5,
                scale: 1.0,
            });
        }

        let mut stream = WorkspaceStream::new(ws, Color::BLACK);
        stream
            .render(&scene, &fx.renderer, &fx.target, &Region::from_rect(rect(0, 0, 100, 100)), false)
            .unwrap();
        assert_eq!(stream.rendered_views(), &[above, below]);
    }

    #[test]
    fn drag_icons_come_first() {
        let fx = fixture();
        let mut scene = Scene::new();
        let ws = Workspace::new(0, 0);
        let window = scene.add_view(ws, View::new((0, 0), Surface::solid((100, 100), BLUE)));
        let icon = scene.add_drag_icon(View::new((10, 10), Surface::solid((8, 8), RED)));

        let mut stream = WorkspaceStream::new(ws, Color::BLACK);
        stream
            .render(&scene, &fx.renderer, &fx.target, &Region::from_rect(rect(0, 0, 100, 100)), true)
            .unwrap();
        assert_eq!(stream.rendered_views(), &[icon, window]);
        assert_eq!(
            fx.software.borrow().pixel(fx.target.buffer, 12, 12),
            Some(RED.to_argb8888())
        );
    }

    #[test]
    fn workspace_boxes_tile_the_grid() {
        let size = Size::from((100, 50));
        let current = Workspace::new(1, 1);
        assert_eq!(workspace_box(current, current, size), rect(0, 0, 100, 50));
        assert_eq!(workspace_box(Workspace::new(0, 1), current, size), rect(-100, 0, 100, 50));
        assert_eq!(workspace_box(Workspace::new(2, 2), current, size), rect(100, 50, 100, 50));
    }
}
