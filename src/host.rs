//! The event-loop side of frame scheduling.
//!
//! A [`FrameHost`] owns the render managers and is the calloop data type. The
//! managers only ever call back into it through idle callbacks and timers.
//! [`HeadlessCompositor`] is the host used by the binary and the tests: it
//! drives [`HeadlessDisplay`] outputs and simulates their vblanks.

use std::{cell::RefCell, rc::Rc, time::Duration};

use smithay::{
    reexports::calloop::{
        LoopHandle, LoopSignal,
        timer::{TimeoutAction, Timer},
    },
    utils::{Clock, Logical, Monotonic, Physical, Point, Size},
};
use tracing::{debug, info, warn};

use crate::{
    backend::{Color, DisplayBackend, HeadlessDisplay, SharedRenderer},
    config::RenderConfig,
    errors::{RenderError, Result},
    render_manager::{FrameOutcome, OutputId, RenderManager},
    scene::{Scene, Workspace},
    view::{Layer, Surface, View, ViewId, ViewTransform},
};

/// Receives the callbacks a [`RenderManager`] schedules on the event loop.
pub trait FrameHost {
    /// The output asked for a new frame.
    fn frame_ready(&mut self, output: OutputId);
    /// A repaint delay or retry timer fired.
    fn repaint(&mut self, output: OutputId);
}

pub struct HeadlessOutput {
    manager: RenderManager<HeadlessCompositor>,
    scene: Scene,
    display: Rc<RefCell<HeadlessDisplay>>,
    animation: Option<Animation>,
}

impl HeadlessOutput {
    pub fn manager(&self) -> &RenderManager<HeadlessCompositor> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut RenderManager<HeadlessCompositor> {
        &mut self.manager
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Scene and manager together, for changes that need damage.
    pub fn parts_mut(&mut self) -> (&mut Scene, &mut RenderManager<HeadlessCompositor>) {
        (&mut self.scene, &mut self.manager)
    }

    pub fn display(&self) -> &Rc<RefCell<HeadlessDisplay>> {
        &self.display
    }
}

/// Slides one view back and forth, one step per vblank.
#[derive(Debug, Clone, Copy)]
struct Animation {
    view: ViewId,
    step: i32,
}

pub struct HeadlessCompositor {
    loop_handle: LoopHandle<'static, HeadlessCompositor>,
    loop_signal: LoopSignal,
    clock: Clock<Monotonic>,
    renderer: SharedRenderer,
    config: RenderConfig,
    outputs: Vec<HeadlessOutput>,
    frame_limit: Option<u64>,
    submitted: u64,
}

impl HeadlessCompositor {
    pub fn new(
        loop_handle: LoopHandle<'static, HeadlessCompositor>,
        loop_signal: LoopSignal,
        renderer: SharedRenderer,
        config: RenderConfig,
    ) -> Self {
        Self {
            loop_handle,
            loop_signal,
            clock: Clock::new(),
            renderer,
            config,
            outputs: Vec::new(),
            frame_limit: None,
            submitted: 0,
        }
    }

    /// Stop the event loop once this many frames reached the screen.
    pub fn set_frame_limit(&mut self, limit: Option<u64>) {
        self.frame_limit = limit;
    }

    pub fn submitted_frames(&self) -> u64 {
        self.submitted
    }

    pub fn add_output(
        &mut self,
        name: &str,
        size: Size<i32, Physical>,
        refresh: Duration,
        scene: Scene,
    ) -> OutputId {
        let id = OutputId(self.outputs.len() as u32);
        let display = Rc::new(RefCell::new(HeadlessDisplay::new(
            name,
            size,
            refresh,
            self.renderer.clone(),
        )));
        let mut manager = RenderManager::new(
            id,
            Box::new(display.clone()),
            self.renderer.clone(),
            self.loop_handle.clone(),
            self.config.clone(),
        );
        manager.schedule_redraw();
        info!(output = name, ?id, "output added");

        self.outputs.push(HeadlessOutput {
            manager,
            scene,
            display,
            animation: None,
        });
        id
    }

    pub fn output(&self, id: OutputId) -> Option<&HeadlessOutput> {
        self.outputs.get(id.0 as usize)
    }

    pub fn output_mut(&mut self, id: OutputId) -> Option<&mut HeadlessOutput> {
        self.outputs.get_mut(id.0 as usize)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &HeadlessOutput> {
        self.outputs.iter()
    }

    /// Move `view` by `step` pixels every vblank, bouncing off the output edges.
    pub fn animate(&mut self, id: OutputId, view: ViewId, step: i32) {
        if let Some(output) = self.output_mut(id) {
            output.animation = Some(Animation { view, step });
            output.manager.schedule_redraw();
        }
    }

    fn after_paint(&mut self, id: OutputId, outcome: Option<FrameOutcome>) {
        let Some(outcome) = outcome else {
            return;
        };
        if !outcome.submitted() {
            return;
        }
        self.submitted += 1;
        if self.frame_limit.is_some_and(|limit| self.submitted >= limit) {
            debug!(frames = self.submitted, "frame limit reached");
            self.loop_signal.stop();
            self.loop_signal.wakeup();
        }

        let Some(output) = self.output(id) else {
            return;
        };
        let refresh = output.manager.repaint_delay().refresh_interval();
        if let Err(err) = self.arm_vblank(id, refresh) {
            warn!(?id, "failed to arm vblank timer: {err}");
        }
    }

    fn arm_vblank(&self, id: OutputId, refresh: Duration) -> Result<()> {
        self.loop_handle
            .insert_source(Timer::from_duration(refresh), move |_, _, host| {
                host.vblank(id);
                TimeoutAction::Drop
            })
            .map(|_| ())
            .map_err(|err| RenderError::EventLoop(err.to_string()))
    }

    fn vblank(&mut self, id: OutputId) {
        let presented = Duration::from(self.clock.now());
        let Some(output) = self.outputs.get_mut(id.0 as usize) else {
            return;
        };
        let refresh = output.display.borrow().refresh_interval();
        output.manager.on_vblank(presented, refresh);

        if let Some(animation) = output.animation {
            step_animation(output, animation);
        }
    }
}

fn step_animation(output: &mut HeadlessOutput, mut animation: Animation) {
    let bounds = output.manager.output_box();
    let Some(view) = output.scene.view_mut(animation.view) else {
        output.animation = None;
        return;
    };

    let before = view.bounding_box();
    let mut x = view.position.x + animation.step;
    if x < bounds.loc.x || x + before.size.w > bounds.loc.x + bounds.size.w {
        animation.step = -animation.step;
        x = view.position.x + animation.step;
    }
    view.position.x = x;
    let after = view.bounding_box();

    output.animation = Some(animation);
    output.manager.damage_box(before);
    output.manager.damage_box(after);
    output.manager.schedule_redraw();
}

impl FrameHost for HeadlessCompositor {
    fn frame_ready(&mut self, id: OutputId) {
        let Some(output) = self.outputs.get_mut(id.0 as usize) else {
            warn!(?id, "frame requested for unknown output");
            return;
        };
        let outcome = output.manager.on_frame(&mut output.scene);
        self.after_paint(id, outcome);
    }

    fn repaint(&mut self, id: OutputId) {
        let Some(output) = self.outputs.get_mut(id.0 as usize) else {
            return;
        };
        let outcome = output.manager.repaint(&mut output.scene);
        self.after_paint(id, outcome);
    }
}

/// A small desktop: a panel, two overlapping windows and a pointer.
///
/// Returns the scene and the translucent window, which is the one worth
/// animating.
pub fn demo_scene(size: Size<i32, Logical>) -> (Scene, ViewId) {
    let mut scene = Scene::new();
    let ws = Workspace::default();

    let panel = View::new(
        (0, 0),
        Surface::solid((size.w, 24.min(size.h)), Color::new(0.12, 0.12, 0.14, 1.0)),
    )
    .with_layer(Layer::Top);
    scene.add_view(ws, panel);

    let window_size = Size::from((size.w / 2, size.h / 2));
    let terminal = View::new(
        (size.w / 8, size.h / 6),
        Surface::solid(window_size, Color::new(0.1, 0.1, 0.1, 1.0)),
    )
    .with_child(
        Surface::solid((window_size.w, 20), Color::new(0.25, 0.25, 0.3, 1.0)).with_offset((0, -20)),
    );
    scene.add_view(ws, terminal);

    let mut glass = View::new(
        (size.w / 3, size.h / 3),
        Surface::solid(window_size, Color::new(0.3, 0.5, 0.9, 0.6)),
    );
    glass.transform = Some(ViewTransform {
        alpha: 0.9,
        scale: 1.0,
    });
    let glass = scene.add_view(ws, glass);

    let off_screen = View::new((0, 0), Surface::solid(size, Color::new(0.6, 0.2, 0.2, 1.0)));
    scene.add_view(Workspace::new(1, 0), off_screen);

    scene.set_cursor(Some(Point::from((size.w / 2, size.h / 2))));
    (scene, glass)
}
