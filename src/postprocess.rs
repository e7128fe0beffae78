//! Full-screen passes applied to the composited frame.
//!
//! The workspace is composited into scratch buffer 0. Each pass reads the
//! previous result and writes the next one, alternating between scratch
//! buffers 1 and 2. The final pass writes straight into the display buffer.

use std::{cell::RefCell, rc::Rc};

use smithay::utils::{Physical, Rectangle, Size};

use crate::{
    backend::{BufferId, GpuBuffer, RenderBackend, RenderTarget, SharedRenderer},
    errors::{RenderError, Result},
};

/// Called with the renderer already bound to the destination.
pub type PostHook =
    Rc<RefCell<dyn FnMut(&mut dyn RenderBackend, &RenderTarget, &RenderTarget) -> Result<()>>>;

pub fn post_hook(
    f: impl FnMut(&mut dyn RenderBackend, &RenderTarget, &RenderTarget) -> Result<()> + 'static,
) -> PostHook {
    Rc::new(RefCell::new(f))
}

fn same_hook(a: &PostHook, b: &PostHook) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

#[derive(Default)]
pub struct PostprocessingChain {
    hooks: Vec<PostHook>,
    buffers: [Option<GpuBuffer>; 3],
}

impl PostprocessingChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the hook is already part of the chain.
    pub fn add(&mut self, hook: PostHook) -> bool {
        if self.hooks.iter().any(|existing| same_hook(existing, &hook)) {
            return false;
        }
        self.hooks.push(hook);
        true
    }

    pub fn remove(&mut self, hook: &PostHook) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|existing| !same_hook(existing, hook));
        self.hooks.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn scratch_buffer(&self, index: usize) -> Option<BufferId> {
        self.buffers.get(index)?.as_ref().map(GpuBuffer::id)
    }

    /// Size buffer 0 for the coming frame, or drop every scratch buffer when
    /// the chain is empty.
    pub fn allocate(&mut self, renderer: &SharedRenderer, size: Size<i32, Physical>) -> Result<()> {
        if self.hooks.is_empty() {
            if self.buffers.iter().any(Option::is_some) {
                tracing::debug!("postprocessing chain empty, releasing scratch buffers");
            }
            self.buffers = Default::default();
            return Ok(());
        }
        ensure_buffer(&mut self.buffers[0], renderer, size)
    }

    /// Where the workspace should be composited this frame.
    pub fn target_framebuffer(&self, renderer: &dyn RenderBackend, display: &RenderTarget) -> RenderTarget {
        match (&self.buffers[0], self.hooks.is_empty()) {
            (Some(buffer), false) => display
                .with_buffer(buffer.id(), false)
                .with_y_flip(renderer.offscreen_y_inverted()),
            _ => display.clone(),
        }
    }

    /// Run every pass in order, ending in `destination`.
    pub fn run(&mut self, renderer: &SharedRenderer, destination: &RenderTarget) -> Result<()> {
        if self.hooks.is_empty() {
            return Ok(());
        }
        let size = destination.size;
        let y_inverted = renderer.borrow().offscreen_y_inverted();
        let scratch_target = |buffer: &GpuBuffer| {
            destination
                .with_buffer(buffer.id(), false)
                .with_y_flip(y_inverted)
        };

        let hooks = self.hooks.clone();
        let mut last = 0usize;
        let mut next = 1usize;
        for (index, hook) in hooks.iter().enumerate() {
            let source = self.buffers[last]
                .as_ref()
                .map(scratch_target)
                .ok_or_else(|| RenderError::Backend("postprocessing source not allocated".into()))?;

            let is_last = index + 1 == hooks.len();
            let target = if is_last {
                destination.clone()
            } else {
                ensure_buffer(&mut self.buffers[next], renderer, size)?;
                self.buffers[next]
                    .as_ref()
                    .map(scratch_target)
                    .ok_or_else(|| RenderError::Backend("postprocessing target not allocated".into()))?
            };

            let mut backend = renderer.borrow_mut();
            backend.begin(&target)?;
            let mut pass = hook.borrow_mut();
            let result = (*pass)(&mut *backend, &source, &target);
            backend.end();
            result?;

            last = next;
            next ^= 0b11;
        }
        Ok(())
    }
}

fn ensure_buffer(
    slot: &mut Option<GpuBuffer>,
    renderer: &SharedRenderer,
    size: Size<i32, Physical>,
) -> Result<()> {
    match slot {
        Some(buffer) => buffer.ensure_size(size),
        None => {
            *slot = Some(GpuBuffer::allocate(renderer, size)?);
            Ok(())
        }
    }
}

/// A pass that copies its source unchanged.
pub fn copy_pass() -> PostHook {
    post_hook(|renderer, source, target| {
        let whole = Rectangle::from_size(target.size);
        renderer.draw_texture(source.buffer, whole, &[whole], 1.0)
    })
}
