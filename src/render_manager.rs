//! Per-output frame orchestration.
//!
//! One [`RenderManager`] drives one output: it decides when to paint, runs the
//! effect hooks, tries direct scanout, composites the current workspace and
//! submits the result to the display.

use std::{cell::RefCell, rc::Rc, time::Duration};

use smithay::{
    reexports::calloop::{
        LoopHandle, RegistrationToken,
        timer::{TimeoutAction, Timer},
    },
    utils::{Clock, Logical, Monotonic, Point, Rectangle, Transform},
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    backend::{BufferId, Color, DisplayBackend, RenderBackend, RenderTarget, SharedRenderer},
    config::RenderConfig,
    cursor::SoftwareCursor,
    damage::DamageTracker,
    depth_pool::DepthBufferPool,
    errors::{RenderError, Result},
    hooks::{EffectHook, EffectHookRegistry, EffectStage},
    host::FrameHost,
    postprocess::{PostHook, PostprocessingChain},
    redraw::RedrawState,
    region::Region,
    repaint_delay::RepaintDelayScheduler,
    scene::{Scene, Workspace},
    stream::{WorkspaceStream, workspace_box},
    view::{LayerMask, SurfaceContent, ViewId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(pub u32);

/// Replaces workspace compositing while set. Called with the renderer bound
/// to the frame target and the frame's output-local damage.
pub type CustomRenderer =
    Rc<RefCell<dyn FnMut(&mut dyn RenderBackend, &RenderTarget, &Region<Logical>) -> Result<()>>>;

pub fn custom_renderer(
    f: impl FnMut(&mut dyn RenderBackend, &RenderTarget, &Region<Logical>) -> Result<()> + 'static,
) -> CustomRenderer {
    Rc::new(RefCell::new(f))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A client buffer was handed to the display as is.
    Scanout,
    Composited,
    /// Nothing changed; the display keeps showing the previous frame.
    Skipped,
    /// Rendering failed; damage is kept for the next attempt.
    Failed,
}

impl FrameOutcome {
    pub fn submitted(self) -> bool {
        matches!(self, FrameOutcome::Scanout | FrameOutcome::Composited)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub composited: u64,
    pub scanout: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Frames that waited for the repaint delay timer.
    pub delayed: u64,
}

/// What an effect hook may touch while it runs.
pub struct EffectContext<'a> {
    pub output: OutputId,
    pub stage: EffectStage,
    damage: &'a mut DamageTracker,
    effects: &'a mut EffectHookRegistry,
    renderer: &'a SharedRenderer,
    target: Option<&'a RenderTarget>,
}

impl EffectContext<'_> {
    pub fn damage(&mut self, region: &Region<Logical>) {
        self.damage.damage(region);
    }

    pub fn damage_box(&mut self, rect: Rectangle<i32, Logical>) {
        self.damage.damage_box(rect);
    }

    pub fn damage_whole(&mut self) {
        self.damage.damage_whole();
    }

    pub fn scheduled_damage(&self) -> Region<Logical> {
        self.damage.get_scheduled_damage()
    }

    pub fn output_box(&self) -> Rectangle<i32, Logical> {
        self.damage.output_box()
    }

    pub fn add_effect(&mut self, hook: EffectHook, stage: EffectStage) -> bool {
        self.effects.add(hook, stage)
    }

    pub fn rem_effect(&mut self, hook: &EffectHook, stage: EffectStage) -> bool {
        self.effects.remove(hook, stage)
    }

    pub fn renderer(&self) -> &SharedRenderer {
        self.renderer
    }

    /// The composited frame; only set for overlay hooks.
    pub fn target(&self) -> Option<&RenderTarget> {
        self.target
    }
}

pub struct RenderManager<D: FrameHost> {
    id: OutputId,
    name: String,
    loop_handle: LoopHandle<'static, D>,
    clock: Clock<Monotonic>,
    renderer: SharedRenderer,
    damage: DamageTracker,
    effects: EffectHookRegistry,
    postprocessing: PostprocessingChain,
    depth_pool: DepthBufferPool,
    delay: RepaintDelayScheduler,
    streams: Vec<WorkspaceStream>,
    current_ws: Workspace,
    custom_renderer: Option<CustomRenderer>,
    cursor: Option<SoftwareCursor>,
    redraw_always: i32,
    inhibit: i32,
    redraw_state: RedrawState,
    last_frame_scanout: bool,
    config: RenderConfig,
    stats: FrameStats,
}

impl<D: FrameHost> RenderManager<D> {
    pub fn new(
        id: OutputId,
        display: Box<dyn DisplayBackend>,
        renderer: SharedRenderer,
        loop_handle: LoopHandle<'static, D>,
        config: RenderConfig,
    ) -> Self {
        let name = display.name();
        let mut delay = RepaintDelayScheduler::new(
            display.refresh_interval(),
            config.max_render_time,
            config.dynamic_delay,
        );
        delay.set_limits(config.max_render_time, config.dynamic_delay);
        let mut damage = DamageTracker::new(display, 1.0, Transform::Normal);
        damage.set_disable_damage_tracking(config.disable_damage_tracking);
        damage.damage_whole();

        let (columns, rows) = config.workspace_grid;
        let streams = (0..rows)
            .flat_map(|y| (0..columns).map(move |x| Workspace::new(x, y)))
            .map(|ws| WorkspaceStream::new(ws, config.background_color))
            .collect();

        info!(output = %name, renderer = renderer.borrow().name(), "render manager created");
        Self {
            id,
            name,
            loop_handle,
            clock: Clock::new(),
            renderer,
            damage,
            effects: EffectHookRegistry::new(),
            postprocessing: PostprocessingChain::new(),
            depth_pool: DepthBufferPool::new(),
            delay,
            streams,
            current_ws: Workspace::default(),
            custom_renderer: None,
            cursor: None,
            redraw_always: 0,
            inhibit: 0,
            redraw_state: RedrawState::Idle,
            last_frame_scanout: false,
            config,
            stats: FrameStats::default(),
        }
    }

    pub fn id(&self) -> OutputId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn renderer(&self) -> &SharedRenderer {
        &self.renderer
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: RenderConfig) {
        let previous_delay = self.delay.delay();
        self.delay
            .set_limits(config.max_render_time, config.dynamic_delay);
        if self.delay.delay() != previous_delay {
            self.rearm_repaint_delay();
        }
        self.damage
            .set_disable_damage_tracking(config.disable_damage_tracking);
        for stream in &mut self.streams {
            stream.background = config.background_color;
        }
        self.config = config;
        self.damage.damage_whole();
        self.schedule_redraw();
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.damage.set_scale(scale);
        self.schedule_redraw();
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.damage.set_transform(transform);
        self.schedule_redraw();
    }

    pub fn output_box(&self) -> Rectangle<i32, Logical> {
        self.damage.output_box()
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.stats
    }

    pub fn redraw_state(&self) -> RedrawState {
        self.redraw_state
    }

    pub fn repaint_delay(&self) -> &RepaintDelayScheduler {
        &self.delay
    }

    pub fn depth_pool(&self) -> &DepthBufferPool {
        &self.depth_pool
    }

    pub fn postprocessing(&self) -> &PostprocessingChain {
        &self.postprocessing
    }

    // Damage

    pub fn damage(&mut self, region: &Region<Logical>) {
        self.damage.damage(region);
    }

    pub fn damage_box(&mut self, rect: Rectangle<i32, Logical>) {
        self.damage.damage_box(rect);
    }

    pub fn damage_whole(&mut self) {
        self.damage.damage_whole();
    }

    pub fn get_scheduled_damage(&self) -> Region<Logical> {
        self.damage.get_scheduled_damage()
    }

    // Hooks

    pub fn add_effect(&mut self, hook: EffectHook, stage: EffectStage) -> bool {
        self.effects.add(hook, stage)
    }

    pub fn rem_effect(&mut self, hook: &EffectHook, stage: EffectStage) -> bool {
        self.effects.remove(hook, stage)
    }

    pub fn add_post(&mut self, hook: PostHook) -> bool {
        let added = self.postprocessing.add(hook);
        if added {
            self.damage.damage_whole();
            self.schedule_redraw();
        }
        added
    }

    pub fn rem_post(&mut self, hook: &PostHook) -> bool {
        let removed = self.postprocessing.remove(hook);
        if removed {
            self.damage.damage_whole();
            self.schedule_redraw();
        }
        removed
    }

    /// Take over compositing, or give it back with `None`.
    pub fn set_renderer(&mut self, renderer: Option<CustomRenderer>) {
        self.custom_renderer = renderer;
        self.damage.damage_whole();
        self.schedule_redraw();
    }

    pub fn set_software_cursor(&mut self, cursor: Option<SoftwareCursor>) {
        self.cursor = cursor;
    }

    /// Move the pointer, repainting the sprite at both positions when the
    /// cursor is drawn in software.
    pub fn move_cursor(&mut self, scene: &mut Scene, position: Option<Point<i32, Logical>>) {
        let previous = scene.cursor();
        scene.set_cursor(position);
        if previous == position || self.damage.display().hardware_cursor() {
            return;
        }
        let Some(cursor) = &self.cursor else {
            return;
        };

        let time = Duration::from(self.clock.now());
        let scale = self.damage.scale();
        let rects: Vec<_> = [previous, position]
            .into_iter()
            .flatten()
            .filter_map(|position| cursor.rect(position, scale, time))
            .collect();
        if rects.is_empty() {
            return;
        }
        for rect in rects {
            self.damage.damage_box(rect);
        }
        self.schedule_redraw();
    }

    /// The buffer workspace compositing draws into, while a frame is open.
    pub fn get_target_framebuffer(&self) -> Option<RenderTarget> {
        let display = self.display_target()?;
        Some(
            self.postprocessing
                .target_framebuffer(&*self.renderer.borrow(), &display),
        )
    }

    fn display_target(&self) -> Option<RenderTarget> {
        let frame = self.damage.frame()?;
        Some(RenderTarget::new(
            frame.buffer,
            frame.size,
            self.damage.scale(),
            self.damage.transform(),
            true,
        ))
    }

    // Redraw requests

    pub fn schedule_redraw(&mut self) {
        let previous = self.redraw_state;
        self.redraw_state = previous.queue_redraw();
        if previous.is_idle() {
            let id = self.id;
            self.loop_handle.insert_idle(move |host: &mut D| host.frame_ready(id));
        }
    }

    /// Reference counted request to paint every refresh.
    pub fn set_redraw_always(&mut self, always: bool) {
        self.redraw_always += if always { 1 } else { -1 };
        if self.redraw_always < 0 {
            error!(output = %self.name, "redraw-always counter went negative");
            self.redraw_always = 0;
        }
        if self.redraw_always > 0 {
            self.schedule_redraw();
        }
    }

    /// Reference counted request to show black instead of the desktop.
    pub fn add_inhibit(&mut self, inhibit: bool) {
        let was_inhibited = self.inhibit > 0;
        self.inhibit += if inhibit { 1 } else { -1 };
        if self.inhibit < 0 {
            error!(output = %self.name, "inhibit counter went negative");
            self.inhibit = 0;
        }
        if was_inhibited != (self.inhibit > 0) {
            debug!(output = %self.name, inhibited = self.inhibit > 0, "output inhibit changed");
            self.damage.damage_whole();
            self.schedule_redraw();
        }
    }

    pub fn is_inhibited(&self) -> bool {
        self.inhibit > 0
    }

    // Workspaces

    pub fn workspace_grid(&self) -> (i32, i32) {
        self.config.workspace_grid
    }

    pub fn current_workspace(&self) -> Workspace {
        self.current_ws
    }

    pub fn set_workspace(&mut self, ws: Workspace) -> Result<()> {
        self.stream_index(ws)?;
        if ws != self.current_ws {
            debug!(output = %self.name, ?ws, "switching workspace");
            self.current_ws = ws;
            self.damage.damage_whole();
            self.schedule_redraw();
        }
        Ok(())
    }

    pub fn stream(&self, ws: Workspace) -> Option<&WorkspaceStream> {
        self.streams.iter().find(|stream| stream.ws == ws)
    }

    fn stream_index(&self, ws: Workspace) -> Result<usize> {
        self.streams
            .iter()
            .position(|stream| stream.ws == ws)
            .ok_or_else(|| {
                RenderError::Backend(format!("workspace {},{} is outside the grid", ws.x, ws.y))
            })
    }

    /// Start rendering `ws` into its own buffer.
    pub fn workspace_stream_start(&mut self, ws: Workspace, scene: &Scene) -> Result<()> {
        let index = self.stream_index(ws)?;
        self.start_stream(index);
        self.update_stream(index, scene, None)
    }

    /// Bring the buffer of a running stream up to date.
    pub fn workspace_stream_update(&mut self, ws: Workspace, scene: &Scene) -> Result<()> {
        let index = self.stream_index(ws)?;
        if !self.streams[index].is_running() {
            return Ok(());
        }
        self.update_stream(index, scene, None)
    }

    pub fn workspace_stream_stop(&mut self, ws: Workspace) -> Result<()> {
        let index = self.stream_index(ws)?;
        self.streams[index].set_running(false);
        Ok(())
    }

    fn start_stream(&mut self, index: usize) {
        let ws = self.streams[index].ws;
        trace!(output = %self.name, ?ws, "starting workspace stream");
        self.streams[index].set_running(true);
        let ws_box = workspace_box(ws, self.current_ws, self.damage.logical_size());
        self.damage.damage_box(ws_box);
    }

    /// Render the stream into `target`, or into its own buffer when `None`.
    fn update_stream(&mut self, index: usize, scene: &Scene, target: Option<&RenderTarget>) -> Result<()> {
        let ws = self.streams[index].ws;
        let ws_box = workspace_box(ws, self.current_ws, self.damage.logical_size());
        let mut ws_damage = self.damage.get_scheduled_damage().intersect_rect(ws_box);
        if ws_damage.is_empty() {
            return Ok(());
        }
        ws_damage.translate(Point::from((-ws_box.loc.x, -ws_box.loc.y)));

        let target = match target {
            Some(target) => target.clone(),
            None => self.streams[index].own_target(
                &self.renderer,
                self.damage.mode_size(),
                self.damage.scale(),
                self.damage.transform(),
            )?,
        };
        let with_drag_icons = ws == self.current_ws;
        self.streams[index].render(scene, &self.renderer, &target, &ws_damage, with_drag_icons)
    }

    // Frame scheduling

    /// The display is ready for a new frame.
    pub fn on_frame(&mut self, scene: &mut Scene) -> Option<FrameOutcome> {
        match std::mem::take(&mut self.redraw_state) {
            RedrawState::Queued => {}
            RedrawState::WaitingForRepaintDelay(token) => {
                self.loop_handle.remove(token);
            }
            other => {
                self.redraw_state = other;
                return None;
            }
        }

        self.delay.start_frame(Duration::from(self.clock.now()));
        let delay = self.delay.delay();
        if delay < Duration::from_millis(1) {
            return Some(self.paint(scene));
        }

        match self.arm_repaint_timer(delay) {
            Ok(token) => {
                trace!(output = %self.name, delay_ms = delay.as_millis() as u64, "delaying repaint");
                self.stats.delayed += 1;
                self.redraw_state = RedrawState::WaitingForRepaintDelay(token);
                None
            }
            Err(err) => {
                warn!(output = %self.name, "failed to arm repaint timer: {err}");
                Some(self.paint(scene))
            }
        }
    }

    /// The repaint delay (or retry) timer fired.
    pub fn repaint(&mut self, scene: &mut Scene) -> Option<FrameOutcome> {
        match std::mem::take(&mut self.redraw_state) {
            RedrawState::WaitingForRepaintDelay(_) => Some(self.paint(scene)),
            other => {
                trace!(output = %self.name, state = ?other, "ignoring stale repaint timer");
                self.redraw_state = other;
                None
            }
        }
    }

    /// The submitted frame reached the screen.
    pub fn on_vblank(&mut self, presented: Duration, refresh: Duration) {
        self.delay.set_refresh_interval(refresh);
        let redraw_needed = match std::mem::take(&mut self.redraw_state) {
            RedrawState::WaitingForVBlank { redraw_needed } => redraw_needed,
            other => {
                warn!(output = %self.name, state = ?other, "unexpected redraw state at vblank");
                self.redraw_state = other;
                return;
            }
        };
        trace!(
            output = %self.name,
            presented_ms = presented.as_millis() as u64,
            refresh_us = refresh.as_micros() as u64,
            "vblank"
        );

        if redraw_needed || self.redraw_always > 0 {
            self.redraw_state = RedrawState::Queued;
            let id = self.id;
            self.loop_handle.insert_idle(move |host: &mut D| host.frame_ready(id));
        }
    }

    fn arm_repaint_timer(&self, delay: Duration) -> Result<RegistrationToken> {
        let id = self.id;
        self.loop_handle
            .insert_source(Timer::from_duration(delay), move |_, _, host: &mut D| {
                host.repaint(id);
                TimeoutAction::Drop
            })
            .map_err(|err| RenderError::EventLoop(err.to_string()))
    }

    /// Replace a pending repaint delay timer after the delay changed.
    fn rearm_repaint_delay(&mut self) {
        let RedrawState::WaitingForRepaintDelay(token) = self.redraw_state else {
            return;
        };
        self.loop_handle.remove(token);
        let delay = self.delay.delay();
        match self.arm_repaint_timer(delay) {
            Ok(token) => {
                trace!(output = %self.name, delay_ms = delay.as_millis() as u64, "repaint delay re-armed");
                self.redraw_state = RedrawState::WaitingForRepaintDelay(token);
            }
            Err(err) => {
                warn!(output = %self.name, "failed to re-arm repaint timer: {err}");
                self.redraw_state = RedrawState::Queued;
                let id = self.id;
                self.loop_handle.insert_idle(move |host: &mut D| host.frame_ready(id));
            }
        }
    }

    fn arm_retry(&mut self) {
        match self.arm_repaint_timer(self.delay.refresh_interval()) {
            Ok(token) => self.redraw_state = RedrawState::WaitingForRepaintDelay(token),
            Err(err) => {
                error!(output = %self.name, "failed to arm retry timer: {err}");
                self.redraw_state = RedrawState::Idle;
            }
        }
    }

    // Painting

    /// Produce one frame.
    pub fn paint(&mut self, scene: &mut Scene) -> FrameOutcome {
        let outcome = self.paint_frame(scene);
        match outcome {
            FrameOutcome::Scanout => self.stats.scanout += 1,
            FrameOutcome::Composited => self.stats.composited += 1,
            FrameOutcome::Skipped => self.stats.skipped += 1,
            FrameOutcome::Failed => self.stats.failed += 1,
        }

        match outcome {
            FrameOutcome::Scanout | FrameOutcome::Composited => {
                self.redraw_state = RedrawState::WaitingForVBlank {
                    redraw_needed: self.redraw_always > 0,
                };
            }
            FrameOutcome::Skipped => self.redraw_state = RedrawState::Idle,
            FrameOutcome::Failed => self.arm_retry(),
        }
        outcome
    }

    fn paint_frame(&mut self, scene: &mut Scene) -> FrameOutcome {
        self.run_effects(EffectStage::Pre, None);
        self.run_effects(EffectStage::Damage, None);

        match self.scanout_candidate(scene) {
            Ok(buffer) => {
                if self.damage.display_mut().attach_scanout(buffer) {
                    trace!(output = %self.name, ?buffer, "direct scanout");
                    self.damage.scanout_presented();
                    self.last_frame_scanout = true;
                    self.send_frame_done(scene);
                    return FrameOutcome::Scanout;
                }
                trace!(output = %self.name, reason = "display-refused", "scanout rejected");
            }
            Err(reason) => trace!(output = %self.name, reason, "scanout rejected"),
        }

        if std::mem::take(&mut self.last_frame_scanout) {
            // The screen shows a client buffer; nothing in our swapchain is current.
            self.damage.damage_whole();
        }
        if self.custom_renderer.is_none()
            && let Ok(index) = self.stream_index(self.current_ws)
            && !self.streams[index].is_running()
        {
            self.start_stream(index);
        }

        let needs_swap = match self.damage.make_current() {
            Ok(needs_swap) => needs_swap,
            Err(err) => {
                error!(output = %self.name, "failed to acquire a buffer: {err}");
                return FrameOutcome::Failed;
            }
        };
        if !needs_swap && self.redraw_always == 0 {
            trace!(output = %self.name, "no damage, skipping frame");
            self.damage.rollback();
            self.delay.skip_frame();
            self.send_frame_done(scene);
            return FrameOutcome::Skipped;
        }

        if let Err(err) = self.render_frame(scene) {
            error!(output = %self.name, "failed to render frame: {err}");
            let mut renderer = self.renderer.borrow_mut();
            if !renderer.is_at_rest() {
                renderer.end();
            }
            drop(renderer);
            self.damage.rollback();
            return FrameOutcome::Failed;
        }

        self.run_effects(EffectStage::Post, None);
        self.send_frame_done(scene);
        FrameOutcome::Composited
    }

    fn render_frame(&mut self, scene: &Scene) -> Result<()> {
        self.damage.accumulate_damage();
        let display_target = self
            .display_target()
            .ok_or_else(|| RenderError::Backend("no frame open".into()))?;

        self.postprocessing
            .allocate(&self.renderer, display_target.size)?;
        let target = self
            .postprocessing
            .target_framebuffer(&*self.renderer.borrow(), &display_target);
        self.depth_pool
            .ensure_depth_buffer(&self.renderer, target.buffer, target.size)?;

        match self.custom_renderer.clone() {
            Some(custom) => {
                let damage = self.damage.get_scheduled_damage();
                let mut renderer = self.renderer.borrow_mut();
                renderer.begin(&target)?;
                let mut custom = custom.borrow_mut();
                let result = (*custom)(&mut *renderer, &target, &damage);
                renderer.end();
                result?;
            }
            None => {
                let index = self.stream_index(self.current_ws)?;
                self.update_stream(index, scene, Some(&target))?;
            }
        }

        self.run_effects(EffectStage::Overlay, Some(&target));
        self.postprocessing.run(&self.renderer, &display_target)?;

        let damage = self.damage.get_scheduled_damage();
        if self.inhibit > 0 {
            let mut renderer = self.renderer.borrow_mut();
            renderer.begin(&display_target)?;
            let result = renderer.clear(Color::BLACK, &display_target.framebuffer_region(&damage));
            renderer.end();
            result?;
        }

        if !self.damage.display().hardware_cursor()
            && let (Some(cursor), Some(position)) = (self.cursor.as_mut(), scene.cursor())
        {
            let time = Duration::from(self.clock.now());
            cursor.draw(&self.renderer, &display_target, position, time, &damage)?;
        }

        self.damage.swap_buffers()
    }

    fn run_effects(&mut self, stage: EffectStage, target: Option<&RenderTarget>) {
        for hook in self.effects.snapshot(stage) {
            // Removed by an earlier hook of this frame.
            if !self.effects.contains(&hook, stage) {
                continue;
            }
            let mut context = EffectContext {
                output: self.id,
                stage,
                damage: &mut self.damage,
                effects: &mut self.effects,
                renderer: &self.renderer,
                target,
            };
            match hook.try_borrow_mut() {
                Ok(mut hook) => (*hook)(&mut context),
                Err(_) => warn!(output = %self.name, ?stage, "effect hook re-entered, skipping"),
            }
        }

        let mut renderer = self.renderer.borrow_mut();
        if !renderer.is_at_rest() {
            error!(output = %self.name, ?stage, "effect hook left the renderer bound");
            renderer.end();
        }
    }

    /// The client buffer to put on screen directly, or why there is none.
    fn scanout_candidate(&self, scene: &Scene) -> std::result::Result<BufferId, &'static str> {
        if !self.config.scanout {
            return Err("scanout-disabled");
        }
        if self.custom_renderer.is_some() {
            return Err("custom-renderer");
        }
        if scene.drag_active() {
            return Err("drag-active");
        }
        if self.inhibit > 0 {
            return Err("inhibited");
        }
        if !self.effects.can_scanout() {
            return Err("overlay-or-post-hooks");
        }
        if !self.postprocessing.is_empty() {
            return Err("postprocessing");
        }
        let display = self.damage.display();
        if display.software_cursor_locks() > 0 {
            return Err("software-cursor-locked");
        }
        if !display.hardware_cursor() && self.cursor.is_some() && scene.cursor().is_some() {
            return Err("software-cursor");
        }

        let visible: Vec<ViewId> = scene
            .views_on_workspace(self.current_ws, LayerMask::all())
            .into_iter()
            .filter(|id| scene.view(*id).is_some_and(|view| view.is_visible()))
            .collect();
        let [id] = visible.as_slice() else {
            return Err("not-single-view");
        };
        let Some(view) = scene.view(*id) else {
            return Err("not-single-view");
        };

        let output_box = self.damage.output_box();
        if !view.mapped {
            return Err("snapshotted");
        }
        if view.geometry() != output_box {
            return Err("geometry-mismatch");
        }
        if view.has_transform() {
            return Err("transformed");
        }
        if !view.children.is_empty() {
            return Err("has-subsurfaces");
        }
        if !view.opaque_region().covers(output_box) {
            return Err("not-opaque");
        }
        let SurfaceContent::Buffer(buffer) = view.surface.content else {
            return Err("no-client-buffer");
        };
        if view.surface.buffer_scale as f64 != self.damage.scale() {
            return Err("buffer-scale-mismatch");
        }
        Ok(buffer)
    }

    fn send_frame_done(&self, scene: &mut Scene) {
        let time = Duration::from(self.clock.now());
        let mut views = scene.views_on_workspace(self.current_ws, LayerMask::all());
        views.extend_from_slice(scene.drag_icons());
        for id in views {
            if let Some(view) = scene.view_mut(id)
                && view.is_visible()
            {
                view.send_frame_done(time);
            }
        }
    }
}

impl<D: FrameHost> std::fmt::Debug for RenderManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderManager")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("workspace", &self.current_ws)
            .field("redraw_state", &self.redraw_state)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
