//! End-to-end runs of the headless compositor on a real event loop.

use std::{cell::RefCell, rc::Rc, time::Duration};

use render_manager::{
    backend::{SharedRenderer, SoftwareRenderer},
    config::RenderConfig,
    host::{HeadlessCompositor, demo_scene},
    redraw::RedrawState,
};
use smithay::{
    reexports::calloop::EventLoop,
    utils::{Physical, Size},
};

fn compositor() -> (EventLoop<'static, HeadlessCompositor>, HeadlessCompositor) {
    let event_loop: EventLoop<'static, HeadlessCompositor> = EventLoop::try_new().unwrap();
    let renderer: SharedRenderer = Rc::new(RefCell::new(SoftwareRenderer::new()));
    let host = HeadlessCompositor::new(
        event_loop.handle(),
        event_loop.get_signal(),
        renderer,
        RenderConfig::default(),
    );
    (event_loop, host)
}

#[test]
fn animated_outputs_run_until_the_frame_limit() {
    let (mut event_loop, mut host) = compositor();
    host.set_frame_limit(Some(8));

    let size: Size<i32, Physical> = Size::from((160, 90));
    let mut ids = Vec::new();
    for name in ["HEADLESS-1", "HEADLESS-2"] {
        let (scene, glass) = demo_scene(size.to_logical(1));
        let id = host.add_output(name, size, Duration::from_millis(4), scene);
        host.animate(id, glass, 3);
        ids.push(id);
    }

    event_loop
        .run(Some(Duration::from_millis(50)), &mut host, |_| {})
        .unwrap();

    assert!(host.submitted_frames() >= 8);
    for id in ids {
        let output = host.output(id).unwrap();
        let stats = output.manager().frame_stats();
        assert!(stats.composited >= 1, "{stats:?}");
        assert_eq!(stats.failed, 0);
        assert!(!output.display().borrow().presentations().is_empty());
    }
}

#[test]
fn static_output_goes_idle_after_one_frame() {
    let (mut event_loop, mut host) = compositor();
    let size: Size<i32, Physical> = Size::from((64, 64));
    let (scene, _) = demo_scene(size.to_logical(1));
    let id = host.add_output("HEADLESS-1", size, Duration::from_millis(2), scene);

    for _ in 0..10 {
        event_loop
            .dispatch(Some(Duration::from_millis(5)), &mut host)
            .unwrap();
    }

    assert_eq!(host.submitted_frames(), 1);
    let manager = host.output(id).unwrap().manager();
    assert_eq!(manager.redraw_state(), RedrawState::Idle);
    assert_eq!(manager.frame_stats().composited, 1);
}
