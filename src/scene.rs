//! Views per workspace, in stacking order, plus drag and cursor state.

use std::collections::HashMap;

use smithay::utils::{Logical, Point};

use crate::view::{Layer, LayerMask, View, ViewArena, ViewId};

/// Position of a workspace in the output's grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Workspace {
    pub x: i32,
    pub y: i32,
}

impl Workspace {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Workspace {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Default)]
pub struct Scene {
    views: ViewArena,
    /// Bottom to top.
    stacks: HashMap<Workspace, Vec<ViewId>>,
    /// Output-local coordinates, drawn above everything on the current workspace.
    drag_icons: Vec<ViewId>,
    drag_active: bool,
    cursor: Option<Point<i32, Logical>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_view(&mut self, workspace: impl Into<Workspace>, view: View) -> ViewId {
        let id = self.views.insert(view);
        self.stacks.entry(workspace.into()).or_default().push(id);
        id
    }

    /// A view that follows the pointer during a drag; not part of any workspace.
    pub fn add_drag_icon(&mut self, view: View) -> ViewId {
        let id = self.views.insert(view);
        self.drag_icons.push(id);
        id
    }

    pub fn remove_view(&mut self, id: ViewId) -> Option<View> {
        let view = self.views.remove(id)?;
        for stack in self.stacks.values_mut() {
            stack.retain(|other| *other != id);
        }
        self.drag_icons.retain(|other| *other != id);
        Some(view)
    }

    /// Move a view to the top of its workspace.
    pub fn raise(&mut self, id: ViewId) -> bool {
        for stack in self.stacks.values_mut() {
            if let Some(index) = stack.iter().position(|other| *other == id) {
                stack.remove(index);
                stack.push(id);
                return true;
            }
        }
        false
    }

    pub fn view(&self, id: ViewId) -> Option<&View> {
        self.views.get(id)
    }

    pub fn view_mut(&mut self, id: ViewId) -> Option<&mut View> {
        self.views.get_mut(id)
    }

    pub fn workspace_of(&self, id: ViewId) -> Option<Workspace> {
        self.stacks
            .iter()
            .find(|(_, stack)| stack.contains(&id))
            .map(|(workspace, _)| *workspace)
    }

    /// Views on `workspace` whose layer is in `mask`, topmost first.
    pub fn views_on_workspace(&self, workspace: Workspace, mask: LayerMask) -> Vec<ViewId> {
        let Some(stack) = self.stacks.get(&workspace) else {
            return Vec::new();
        };
        let mut views = Vec::with_capacity(stack.len());
        for layer in Layer::STACKING {
            if !mask.contains(layer.mask()) {
                continue;
            }
            views.extend(
                stack
                    .iter()
                    .rev()
                    .filter(|id| self.views.get(**id).is_some_and(|view| view.layer == layer)),
            );
        }
        views
    }

    pub fn drag_icons(&self) -> &[ViewId] {
        &self.drag_icons
    }

    pub fn set_drag_active(&mut self, active: bool) {
        self.drag_active = active;
    }

    pub fn drag_active(&self) -> bool {
        self.drag_active
    }

    /// Pointer position in output-local coordinates; `None` hides the cursor.
    pub fn set_cursor(&mut self, position: Option<Point<i32, Logical>>) {
        self.cursor = position;
    }

    pub fn cursor(&self) -> Option<Point<i32, Logical>> {
        self.cursor
    }
}
