//! Depth attachments for render targets, at most three alive at a time.

use smithay::utils::{Physical, Size};

use crate::{
    backend::{BufferId, DepthAttachment, DepthId, SharedRenderer},
    errors::Result,
};

pub const DEPTH_POOL_CAPACITY: usize = 3;

#[derive(Debug)]
struct DepthSlot {
    attachment: DepthAttachment,
    target: BufferId,
    last_used: u64,
}

#[derive(Debug, Default)]
pub struct DepthBufferPool {
    slots: [Option<DepthSlot>; DEPTH_POOL_CAPACITY],
    /// Logical clock stamped on every attach.
    tick: u64,
}

impl DepthBufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `target` has a depth attachment of `size`.
    pub fn ensure_depth_buffer(
        &mut self,
        renderer: &SharedRenderer,
        target: BufferId,
        size: Size<i32, Physical>,
    ) -> Result<DepthId> {
        let index = match self.find(target) {
            Some(index) => {
                if let Some(slot) = &self.slots[index]
                    && slot.attachment.size() == size
                {
                    return Ok(slot.attachment.id());
                }
                index
            }
            None => self.victim(),
        };

        // Release the old attachment before allocating its replacement.
        if let Some(old) = self.slots[index].take() {
            tracing::trace!(target = ?old.target, "evicting depth attachment");
        }

        let attachment = DepthAttachment::allocate(renderer, size)?;
        let id = attachment.id();
        renderer.borrow_mut().attach_depth(target, id)?;

        self.tick += 1;
        self.slots[index] = Some(DepthSlot {
            attachment,
            target,
            last_used: self.tick,
        });
        Ok(id)
    }

    fn find(&self, target: BufferId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|slot| slot.target == target))
    }

    /// First free slot, else the least recently attached one.
    fn victim(&self) -> usize {
        if let Some(free) = self.slots.iter().position(Option::is_none) {
            return free;
        }
        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(_, slot)| slot.as_ref().map_or(0, |slot| slot.last_used))
            .map_or(0, |(index, _)| index)
    }

    pub fn is_bound(&self, target: BufferId) -> bool {
        self.find(target).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.slots = Default::default();
    }
}
