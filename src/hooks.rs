//! Effect hooks invoked at fixed points of the frame.

use std::{cell::RefCell, rc::Rc};

use crate::render_manager::EffectContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectStage {
    /// Before anything else; plugins update their state here.
    Pre,
    /// Plugins add damage for the coming frame.
    Damage,
    /// Drawn on top of the composited workspace.
    Overlay,
    /// After the frame has been submitted.
    Post,
}

impl EffectStage {
    pub const ALL: [EffectStage; 4] = [
        EffectStage::Pre,
        EffectStage::Damage,
        EffectStage::Overlay,
        EffectStage::Post,
    ];

    fn index(self) -> usize {
        match self {
            EffectStage::Pre => 0,
            EffectStage::Damage => 1,
            EffectStage::Overlay => 2,
            EffectStage::Post => 3,
        }
    }
}

pub type EffectHook = Rc<RefCell<dyn FnMut(&mut EffectContext<'_>)>>;

pub fn effect_hook(f: impl FnMut(&mut EffectContext<'_>) + 'static) -> EffectHook {
    Rc::new(RefCell::new(f))
}

fn same_hook(a: &EffectHook, b: &EffectHook) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// One ordered hook list per stage.
#[derive(Default)]
pub struct EffectHookRegistry {
    stages: [Vec<EffectHook>; 4],
}

impl EffectHookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the hook was already registered for `stage`.
    pub fn add(&mut self, hook: EffectHook, stage: EffectStage) -> bool {
        let list = &mut self.stages[stage.index()];
        if list.iter().any(|existing| same_hook(existing, &hook)) {
            return false;
        }
        list.push(hook);
        true
    }

    /// Returns false if the hook was not registered for `stage`.
    pub fn remove(&mut self, hook: &EffectHook, stage: EffectStage) -> bool {
        let list = &mut self.stages[stage.index()];
        let before = list.len();
        list.retain(|existing| !same_hook(existing, hook));
        list.len() != before
    }

    pub fn contains(&self, hook: &EffectHook, stage: EffectStage) -> bool {
        self.stages[stage.index()]
            .iter()
            .any(|existing| same_hook(existing, hook))
    }

    /// The hooks registered for `stage`, in invocation order.
    pub fn snapshot(&self, stage: EffectStage) -> Vec<EffectHook> {
        self.stages[stage.index()].clone()
    }

    pub fn len(&self, stage: EffectStage) -> usize {
        self.stages[stage.index()].len()
    }

    pub fn is_empty(&self, stage: EffectStage) -> bool {
        self.stages[stage.index()].is_empty()
    }

    /// Overlay and post hooks need a composited frame, which direct scanout skips.
    pub fn can_scanout(&self) -> bool {
        self.is_empty(EffectStage::Overlay) && self.is_empty(EffectStage::Post)
    }
}
