//! Frame orchestration against the software renderer and the headless display.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};

use render_manager::{
    RenderError, RenderManager,
    backend::{
        Color, GpuBuffer, HeadlessDisplay, RenderBackend, SharedRenderer, SoftwareRenderer,
        headless::Presentation,
    },
    config::RenderConfig,
    cursor::{CursorThemeManager, SoftwareCursor},
    hooks::{EffectStage, effect_hook},
    host::FrameHost,
    postprocess::{copy_pass, post_hook},
    redraw::RedrawState,
    region::Region,
    render_manager::{FrameOutcome, OutputId, custom_renderer},
    scene::{Scene, Workspace},
    view::{Surface, View, ViewId, ViewTransform},
};
use smithay::{
    reexports::calloop::EventLoop,
    utils::{Logical, Rectangle, Size},
};

const REFRESH: Duration = Duration::from_millis(16);
const SIZE: (i32, i32) = (100, 100);
const CLIENT: u32 = 0xff11_2233;
const RED: Color = Color::new(1.0, 0.0, 0.0, 1.0);
const GREEN: Color = Color::new(0.0, 1.0, 0.0, 1.0);

#[derive(Default)]
struct Recorder {
    frame_ready: Vec<OutputId>,
    repaint: Vec<OutputId>,
}

impl FrameHost for Recorder {
    fn frame_ready(&mut self, output: OutputId) {
        self.frame_ready.push(output);
    }

    fn repaint(&mut self, output: OutputId) {
        self.repaint.push(output);
    }
}

struct Harness {
    event_loop: EventLoop<'static, Recorder>,
    recorder: Recorder,
    software: Rc<RefCell<SoftwareRenderer>>,
    renderer: SharedRenderer,
    display: Rc<RefCell<HeadlessDisplay>>,
    manager: RenderManager<Recorder>,
    scene: Scene,
}

impl Harness {
    fn new(config: RenderConfig) -> Self {
        let event_loop: EventLoop<'static, Recorder> = EventLoop::try_new().unwrap();
        let software = Rc::new(RefCell::new(SoftwareRenderer::new()));
        let renderer: SharedRenderer = software.clone();
        let display = Rc::new(RefCell::new(HeadlessDisplay::new(
            "TEST-1",
            Size::from(SIZE),
            REFRESH,
            renderer.clone(),
        )));
        let manager = RenderManager::new(
            OutputId(0),
            Box::new(display.clone()),
            renderer.clone(),
            event_loop.handle(),
            config,
        );
        Self {
            event_loop,
            recorder: Recorder::default(),
            software,
            renderer,
            display,
            manager,
            scene: Scene::new(),
        }
    }

    /// Paint and, if something reached the screen, deliver its vblank.
    fn frame(&mut self) -> FrameOutcome {
        let outcome = self.manager.paint(&mut self.scene);
        if outcome.submitted() {
            self.manager.on_vblank(Duration::ZERO, REFRESH);
        }
        outcome
    }

    fn dispatch(&mut self, timeout: Duration) {
        self.event_loop
            .dispatch(Some(timeout), &mut self.recorder)
            .unwrap();
    }

    fn pixel(&self, x: i32, y: i32) -> u32 {
        let buffer = self.display.borrow().front_buffer().unwrap();
        self.software.borrow().pixel(buffer, x, y).unwrap()
    }

    fn last_presentation(&self) -> Presentation {
        self.display.borrow().last_presentation().cloned().unwrap()
    }

    fn presentation_count(&self) -> usize {
        self.display.borrow().presentations().len()
    }

    /// A fullscreen, fully opaque client buffer on the current workspace.
    fn fullscreen_client(&mut self) -> (GpuBuffer, ViewId) {
        let pixels = vec![CLIENT; (SIZE.0 * SIZE.1) as usize];
        let buffer = GpuBuffer::import(&self.renderer, Size::from(SIZE), &pixels).unwrap();
        let view = View::new((0, 0), Surface::buffer(SIZE, buffer.id(), 1).fully_opaque());
        let id = self.scene.add_view(Workspace::default(), view);
        self.manager.damage_whole();
        (buffer, id)
    }
}

fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
    Rectangle::new((x, y).into(), (w, h).into())
}

fn whole_output() -> Rectangle<i32, Logical> {
    rect(0, 0, SIZE.0, SIZE.1)
}

#[test]
fn first_frame_paints_the_background() {
    let mut h = Harness::new(RenderConfig::default());
    assert_eq!(h.frame(), FrameOutcome::Composited);

    let Presentation::Composited { damage, .. } = h.last_presentation() else {
        panic!("expected a composited frame");
    };
    assert_eq!(damage.area(), (SIZE.0 * SIZE.1) as i64);
    assert_eq!(h.pixel(50, 50), RenderConfig::default().background_color.to_argb8888());
    assert!(h.software.borrow().is_at_rest());
}

#[test]
fn undamaged_frame_is_skipped_but_clients_still_get_frame_done() {
    let mut h = Harness::new(RenderConfig::default());
    let view = h
        .scene
        .add_view(Workspace::default(), View::new((10, 10), Surface::solid((20, 20), RED)));

    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert_eq!(h.frame(), FrameOutcome::Skipped);
    assert_eq!(h.presentation_count(), 1);
    assert_eq!(h.manager.frame_stats().skipped, 1);
    assert_eq!(h.manager.redraw_state(), RedrawState::Idle);
    assert_eq!(h.scene.view(view).unwrap().frame_done_count(), 2);
}

#[test]
fn repeated_damage_schedules_the_same_region() {
    let mut h = Harness::new(RenderConfig::default());
    h.frame();

    h.manager.damage_box(rect(10, 10, 20, 20));
    let once = h.manager.get_scheduled_damage();
    h.manager.damage_box(rect(10, 10, 20, 20));
    h.manager.damage(&Region::from_rect(rect(10, 10, 20, 20)));
    assert_eq!(h.manager.get_scheduled_damage(), once);
    assert_eq!(once.area(), 400);
}

#[test]
fn failed_frame_keeps_its_damage() {
    let mut h = Harness::new(RenderConfig::default());
    let fail = Rc::new(Cell::new(true));
    let flag = fail.clone();
    h.manager
        .set_renderer(Some(custom_renderer(move |renderer, target, damage| {
            if flag.get() {
                return Err(RenderError::Backend("shader compile failed".into()));
            }
            renderer.clear(Color::BLACK, &target.framebuffer_region(damage))
        })));

    assert_eq!(h.frame(), FrameOutcome::Failed);
    assert!(h.manager.get_scheduled_damage().covers(whole_output()));
    assert!(h.software.borrow().is_at_rest());
    assert_eq!(h.presentation_count(), 0);
    assert!(matches!(
        h.manager.redraw_state(),
        RedrawState::WaitingForRepaintDelay(_)
    ));

    fail.set(false);
    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert!(h.manager.get_scheduled_damage().is_empty());
    assert_eq!(h.pixel(50, 50), 0xff00_0000);
    assert_eq!(h.manager.frame_stats().failed, 1);
}

#[test]
fn off_screen_damage_survives_skipped_frames() {
    let mut h = Harness::new(RenderConfig::default());
    assert_eq!(h.frame(), FrameOutcome::Composited);

    // On the workspace to the right of the visible one.
    let beside = rect(SIZE.0 + 50, 10, 20, 20);
    h.manager.damage_box(beside);
    for _ in 0..3 {
        assert_eq!(h.frame(), FrameOutcome::Skipped);
        assert!(h.manager.get_scheduled_damage().covers(beside));
    }
    assert_eq!(h.manager.frame_stats().skipped, 3);

    let visible = rect(10, 10, 10, 10);
    h.manager.damage_box(visible);
    let scheduled = h.manager.get_scheduled_damage();
    assert!(scheduled.covers(beside));
    assert!(scheduled.covers(visible));
    assert_eq!(scheduled.area(), 400 + 100);

    assert_eq!(h.frame(), FrameOutcome::Composited);
    let Presentation::Composited { damage, .. } = h.last_presentation() else {
        panic!("expected a composited frame");
    };
    assert!(damage.covers(Rectangle::new((10, 10).into(), (10, 10).into())));
    assert!(h.manager.get_scheduled_damage().is_empty());
}

#[test]
fn fullscreen_opaque_client_is_scanned_out_without_rendering() {
    let mut h = Harness::new(RenderConfig::default());
    let (buffer, _) = h.fullscreen_client();

    assert_eq!(h.frame(), FrameOutcome::Scanout);
    assert_eq!(
        h.last_presentation(),
        Presentation::Scanout {
            buffer: buffer.id()
        }
    );
    assert_eq!(h.software.borrow().draw_calls(), 0);
    assert!(h.manager.get_scheduled_damage().is_empty());
}

fn outcome_with(setup: impl FnOnce(&mut Harness)) -> FrameOutcome {
    let mut h = Harness::new(RenderConfig::default());
    let _client = h.fullscreen_client();
    setup(&mut h);
    h.frame()
}

#[test]
fn scanout_gating() {
    assert_eq!(outcome_with(|_| {}), FrameOutcome::Scanout);
    assert_eq!(
        outcome_with(|h| {
            h.manager.add_effect(effect_hook(|_| {}), EffectStage::Pre);
        }),
        FrameOutcome::Scanout
    );

    assert_eq!(
        outcome_with(|h| {
            h.manager.add_effect(effect_hook(|_| {}), EffectStage::Overlay);
        }),
        FrameOutcome::Composited
    );
    assert_eq!(
        outcome_with(|h| {
            h.manager.add_effect(effect_hook(|_| {}), EffectStage::Post);
        }),
        FrameOutcome::Composited
    );
    assert_eq!(
        outcome_with(|h| {
            h.manager.add_post(copy_pass());
        }),
        FrameOutcome::Composited
    );
    assert_eq!(
        outcome_with(|h| {
            h.scene.add_view(
                Workspace::default(),
                View::new((10, 10), Surface::solid((10, 10), RED)),
            );
        }),
        FrameOutcome::Composited
    );
    assert_eq!(
        outcome_with(|h| h.manager.add_inhibit(true)),
        FrameOutcome::Composited
    );
    assert_eq!(
        outcome_with(|h| h.scene.set_drag_active(true)),
        FrameOutcome::Composited
    );
    assert_eq!(
        outcome_with(|h| h.display.borrow_mut().cursor_locks = 1),
        FrameOutcome::Composited
    );
    assert_eq!(
        outcome_with(|h| h.display.borrow_mut().reject_scanout = true),
        FrameOutcome::Composited
    );
    assert_eq!(
        outcome_with(|h| {
            let mut config = RenderConfig::default();
            config.scanout = false;
            h.manager.set_config(config);
        }),
        FrameOutcome::Composited
    );
    assert_eq!(
        outcome_with(|h| {
            h.manager
                .set_renderer(Some(custom_renderer(|_, _, _| Ok(()))));
        }),
        FrameOutcome::Composited
    );
}

#[test]
fn scanout_needs_an_opaque_untransformed_client() {
    let mut h = Harness::new(RenderConfig::default());
    let (_buffer, id) = h.fullscreen_client();
    h.scene.view_mut(id).unwrap().surface.opaque = Region::from_rect(rect(0, 0, 50, 50));
    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert_eq!(h.pixel(10, 10), CLIENT);
    assert_eq!(h.pixel(90, 90), CLIENT);

    let mut h = Harness::new(RenderConfig::default());
    let (_buffer, id) = h.fullscreen_client();
    h.scene.view_mut(id).unwrap().transform = Some(ViewTransform::default());
    assert_eq!(h.frame(), FrameOutcome::Composited);

    let mut h = Harness::new(RenderConfig::default());
    let (_buffer, id) = h.fullscreen_client();
    h.scene.view_mut(id).unwrap().surface.buffer_scale = 2;
    assert_eq!(h.frame(), FrameOutcome::Composited);

    let mut h = Harness::new(RenderConfig::default());
    let (_buffer, id) = h.fullscreen_client();
    h.scene
        .view_mut(id)
        .unwrap()
        .children
        .push(Surface::solid((10, 10), RED));
    assert_eq!(h.frame(), FrameOutcome::Composited);

    let mut h = Harness::new(RenderConfig::default());
    let (_buffer, id) = h.fullscreen_client();
    h.scene.view_mut(id).unwrap().position = (1, 0).into();
    assert_eq!(h.frame(), FrameOutcome::Composited);
}

#[test]
fn frame_after_scanout_repaints_everything() {
    let mut h = Harness::new(RenderConfig::default());
    let _client = h.fullscreen_client();
    assert_eq!(h.frame(), FrameOutcome::Scanout);

    h.manager
        .add_effect(effect_hook(|_| {}), EffectStage::Overlay);
    assert_eq!(h.frame(), FrameOutcome::Composited);
    let Presentation::Composited { damage, .. } = h.last_presentation() else {
        panic!("expected a composited frame");
    };
    assert_eq!(damage.area(), (SIZE.0 * SIZE.1) as i64);
    assert_eq!(h.pixel(50, 50), CLIENT);
}

#[test]
fn occluded_views_are_not_drawn() {
    let mut h = Harness::new(RenderConfig::default());
    let ws = Workspace::default();
    h.scene
        .add_view(ws, View::new((20, 20), Surface::solid((10, 10), GREEN)));
    let top = h
        .scene
        .add_view(ws, View::new((0, 0), Surface::solid(SIZE, RED)));

    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert_eq!(h.manager.stream(ws).unwrap().rendered_views(), &[top]);
    assert_eq!(h.pixel(25, 25), RED.to_argb8888());
}

#[test]
fn inhibited_output_shows_black() {
    let mut h = Harness::new(RenderConfig::default());
    h.scene.add_view(
        Workspace::default(),
        View::new((0, 0), Surface::solid(SIZE, RED)),
    );

    h.manager.add_inhibit(true);
    assert!(h.manager.is_inhibited());
    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert_eq!(h.pixel(50, 50), 0xff00_0000);

    h.manager.add_inhibit(false);
    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert_eq!(h.pixel(50, 50), RED.to_argb8888());

    // Unbalanced release clamps at zero.
    h.manager.add_inhibit(false);
    assert!(!h.manager.is_inhibited());
    h.manager.add_inhibit(true);
    assert!(h.manager.is_inhibited());
}

#[test]
fn redraw_always_paints_without_damage() {
    let mut h = Harness::new(RenderConfig::default());
    assert_eq!(h.frame(), FrameOutcome::Composited);

    h.manager.set_redraw_always(true);
    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert_eq!(h.manager.redraw_state(), RedrawState::Queued);

    h.manager.set_redraw_always(false);
    assert_eq!(h.frame(), FrameOutcome::Skipped);
    assert_eq!(h.manager.redraw_state(), RedrawState::Idle);
}

#[test]
fn redraw_requests_go_through_the_event_loop() {
    let mut h = Harness::new(RenderConfig::default());
    assert_eq!(h.manager.on_frame(&mut h.scene), None);

    h.manager.schedule_redraw();
    assert_eq!(h.manager.redraw_state(), RedrawState::Queued);
    h.dispatch(Duration::ZERO);
    assert_eq!(h.recorder.frame_ready, vec![OutputId(0)]);

    assert_eq!(
        h.manager.on_frame(&mut h.scene),
        Some(FrameOutcome::Composited)
    );
    assert_eq!(
        h.manager.redraw_state(),
        RedrawState::WaitingForVBlank {
            redraw_needed: false
        }
    );

    // A request during the flip is remembered, not dispatched.
    h.manager.schedule_redraw();
    h.dispatch(Duration::ZERO);
    assert_eq!(h.recorder.frame_ready.len(), 1);

    h.manager.on_vblank(Duration::ZERO, REFRESH);
    assert_eq!(h.manager.redraw_state(), RedrawState::Queued);
    h.dispatch(Duration::ZERO);
    assert_eq!(h.recorder.frame_ready.len(), 2);
}

#[test]
fn repaint_delay_defers_the_frame() {
    let config = RenderConfig {
        max_render_time: 10,
        dynamic_delay: false,
        ..RenderConfig::default()
    };
    let mut h = Harness::new(config);
    assert_eq!(h.manager.repaint_delay().delay(), Duration::from_millis(6));

    h.manager.schedule_redraw();
    assert_eq!(h.manager.on_frame(&mut h.scene), None);
    assert!(matches!(
        h.manager.redraw_state(),
        RedrawState::WaitingForRepaintDelay(_)
    ));
    assert_eq!(h.manager.frame_stats().delayed, 1);

    for _ in 0..20 {
        if !h.recorder.repaint.is_empty() {
            break;
        }
        h.dispatch(Duration::from_millis(10));
    }
    assert_eq!(h.recorder.repaint, vec![OutputId(0)]);
    assert_eq!(
        h.manager.repaint(&mut h.scene),
        Some(FrameOutcome::Composited)
    );
    assert_eq!(h.manager.repaint(&mut h.scene), None);
}

#[test]
fn config_change_re_arms_the_pending_repaint_delay() {
    let mut h = Harness::new(RenderConfig {
        max_render_time: 1,
        dynamic_delay: false,
        ..RenderConfig::default()
    });
    assert_eq!(h.manager.repaint_delay().delay(), Duration::from_millis(15));

    h.manager.schedule_redraw();
    assert_eq!(h.manager.on_frame(&mut h.scene), None);

    h.manager.set_config(RenderConfig {
        max_render_time: -1,
        ..RenderConfig::default()
    });
    assert!(h.manager.repaint_delay().delay().is_zero());
    assert!(matches!(
        h.manager.redraw_state(),
        RedrawState::WaitingForRepaintDelay(_)
    ));

    // The old timer had 15ms left.
    for _ in 0..3 {
        if !h.recorder.repaint.is_empty() {
            break;
        }
        h.dispatch(Duration::from_millis(2));
    }
    assert_eq!(h.recorder.repaint, vec![OutputId(0)]);
    assert_eq!(
        h.manager.repaint(&mut h.scene),
        Some(FrameOutcome::Composited)
    );
}

#[test]
fn hooks_removed_mid_frame_do_not_run() {
    let mut h = Harness::new(RenderConfig::default());
    let calls = Rc::new(RefCell::new(Vec::new()));

    let log = calls.clone();
    let second = effect_hook(move |_| log.borrow_mut().push("second"));
    let log = calls.clone();
    let victim = second.clone();
    let first = effect_hook(move |ctx| {
        log.borrow_mut().push("first");
        ctx.rem_effect(&victim, EffectStage::Pre);
    });

    assert!(h.manager.add_effect(first.clone(), EffectStage::Pre));
    assert!(!h.manager.add_effect(first, EffectStage::Pre));
    assert!(h.manager.add_effect(second, EffectStage::Pre));

    h.frame();
    h.frame();
    assert_eq!(*calls.borrow(), vec!["first", "first"]);
}

#[test]
fn damage_from_pre_hooks_lands_in_the_same_frame() {
    let mut h = Harness::new(RenderConfig::default());
    h.frame();
    h.frame();

    h.manager.add_effect(
        effect_hook(|ctx| ctx.damage_box(Rectangle::new((10, 10).into(), (5, 5).into()))),
        EffectStage::Pre,
    );
    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert_eq!(h.frame(), FrameOutcome::Composited);
}

#[test]
fn damage_from_overlay_hooks_lands_in_the_next_frame() {
    let mut h = Harness::new(RenderConfig::default());
    h.frame();

    let badge = rect(10, 10, 5, 5);
    let armed = Rc::new(Cell::new(false));
    let flag = armed.clone();
    h.manager.add_effect(
        effect_hook(move |ctx| {
            if flag.replace(false) {
                ctx.damage_box(badge);
            }
        }),
        EffectStage::Overlay,
    );

    armed.set(true);
    h.manager.damage_box(rect(50, 50, 10, 10));
    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert!(!armed.get());
    assert!(h.manager.get_scheduled_damage().covers(badge));

    assert_eq!(h.frame(), FrameOutcome::Composited);
    let Presentation::Composited { damage, .. } = h.last_presentation() else {
        panic!("expected a composited frame");
    };
    assert!(damage.covers(Rectangle::new((10, 10).into(), (5, 5).into())));
    assert!(h.manager.get_scheduled_damage().is_empty());
    assert_eq!(h.frame(), FrameOutcome::Skipped);
}

#[test]
fn overlay_hooks_draw_on_top_of_the_workspace() {
    let mut h = Harness::new(RenderConfig::default());
    h.scene.add_view(
        Workspace::default(),
        View::new((0, 0), Surface::solid(SIZE, RED)),
    );
    h.manager.add_effect(
        effect_hook(|ctx| {
            let Some(target) = ctx.target().cloned() else {
                return;
            };
            let mut renderer = ctx.renderer().borrow_mut();
            renderer.begin(&target).unwrap();
            let badge = target.framebuffer_box(Rectangle::new((0, 0).into(), (10, 10).into()));
            renderer.draw_rect(GREEN, badge, &[badge]).unwrap();
            renderer.end();
        }),
        EffectStage::Overlay,
    );

    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert_eq!(h.pixel(5, 5), GREEN.to_argb8888());
    assert_eq!(h.pixel(50, 50), RED.to_argb8888());
}

#[test]
fn postprocessing_runs_between_workspace_and_display() {
    let mut h = Harness::new(RenderConfig::default());
    let tint = post_hook(|renderer, source, target| {
        let whole = Rectangle::from_size(target.size);
        renderer.draw_texture(source.buffer, whole, &[whole], 1.0)?;
        let corner = Rectangle::new((0, 0).into(), (10, 10).into());
        renderer.draw_rect(GREEN, corner, &[corner])
    });
    assert!(h.manager.add_post(tint.clone()));

    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert_eq!(h.pixel(5, 5), GREEN.to_argb8888());
    assert_eq!(
        h.pixel(50, 50),
        RenderConfig::default().background_color.to_argb8888()
    );
    let scratch = h.manager.postprocessing().scratch_buffer(0).unwrap();
    assert!(h.manager.depth_pool().is_bound(scratch));

    assert!(h.manager.rem_post(&tint));
    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert_eq!(h.manager.postprocessing().scratch_buffer(0), None);
}

#[test]
fn display_buffer_gets_a_depth_attachment() {
    let mut h = Harness::new(RenderConfig::default());
    h.frame();
    let front = h.display.borrow().front_buffer().unwrap();
    assert!(h.manager.depth_pool().is_bound(front));
    assert!(h.software.borrow().depth_of(front).is_some());
}

#[test]
fn workspace_switch_and_streams() {
    let mut h = Harness::new(RenderConfig::default());
    let other = Workspace::new(1, 0);
    h.scene
        .add_view(other, View::new((0, 0), Surface::solid(SIZE, RED)));

    assert!(h.manager.set_workspace(Workspace::new(5, 5)).is_err());
    h.manager.set_workspace(other).unwrap();
    assert_eq!(h.manager.current_workspace(), other);
    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert_eq!(h.pixel(50, 50), RED.to_argb8888());

    let below = Workspace::new(0, 1);
    h.manager.workspace_stream_start(below, &h.scene).unwrap();
    let stream = h.manager.stream(below).unwrap();
    assert!(stream.is_running());
    assert!(stream.buffer().is_some());

    h.manager.workspace_stream_stop(below).unwrap();
    assert!(!h.manager.stream(below).unwrap().is_running());
    assert!(h.manager.workspace_stream_update(Workspace::new(9, 9), &h.scene).is_err());
}

#[test]
fn software_cursor_blocks_scanout_and_is_drawn() {
    let mut h = Harness::new(RenderConfig::default());
    let _client = h.fullscreen_client();
    h.display.borrow_mut().hardware_cursor = false;
    h.manager
        .set_software_cursor(Some(SoftwareCursor::new(CursorThemeManager::fallback())));
    h.scene.set_cursor(Some((50, 50).into()));

    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert_eq!(h.pixel(50, 50), 0xff00_0000);
    assert_eq!(h.pixel(20, 20), CLIENT);
}

#[test]
fn scale_change_damages_the_whole_output() {
    let mut h = Harness::new(RenderConfig::default());
    h.frame();
    h.frame();

    h.manager.set_scale(2.0);
    assert_eq!(h.manager.output_box(), rect(0, 0, 50, 50));
    assert!(h.manager.get_scheduled_damage().covers(rect(0, 0, 50, 50)));
    assert_eq!(h.frame(), FrameOutcome::Composited);
}

#[test]
fn moving_the_software_cursor_repaints_both_positions() {
    let mut h = Harness::new(RenderConfig::default());
    h.display.borrow_mut().hardware_cursor = false;
    h.manager
        .set_software_cursor(Some(SoftwareCursor::new(CursorThemeManager::fallback())));

    h.manager.move_cursor(&mut h.scene, Some((50, 50).into()));
    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert_eq!(h.pixel(50, 50), 0xff00_0000);
    assert_eq!(h.frame(), FrameOutcome::Skipped);

    h.manager.move_cursor(&mut h.scene, Some((10, 10).into()));
    assert_eq!(h.scene.cursor(), Some((10, 10).into()));
    let scheduled = h.manager.get_scheduled_damage();
    assert!(scheduled.covers(rect(50, 50, 1, 1)));
    assert!(scheduled.covers(rect(10, 10, 1, 1)));

    assert_eq!(h.frame(), FrameOutcome::Composited);
    assert_eq!(h.pixel(10, 10), 0xff00_0000);
    assert_eq!(
        h.pixel(50, 50),
        RenderConfig::default().background_color.to_argb8888()
    );

    // Unchanged position, nothing to repaint.
    h.manager.move_cursor(&mut h.scene, Some((10, 10).into()));
    assert!(h.manager.get_scheduled_damage().is_empty());
}
