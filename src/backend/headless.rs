//! Display backend without real hardware.
//!
//! Emulates a double-buffered output: buffer ages, per-frame damage history and
//! direct scanout of client buffers. Vblank timing is simulated by the host.

use std::{collections::VecDeque, time::Duration};

use smithay::utils::{Buffer, Physical, Rectangle, Size};

use super::{BufferId, DisplayBackend, FrameStart, GpuBuffer, SharedRenderer};
use crate::{errors::Result, region::Region};

const SWAPCHAIN_LEN: usize = 2;
const DAMAGE_HISTORY_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum Presentation {
    Composited { buffer: BufferId, damage: Region<Buffer> },
    Scanout { buffer: BufferId },
}

pub struct HeadlessDisplay {
    name: String,
    size: Size<i32, Physical>,
    refresh: Duration,
    renderer: SharedRenderer,
    swapchain: [Option<GpuBuffer>; SWAPCHAIN_LEN],
    /// Age of each swapchain slot; 0 means its contents are unknown.
    ages: [usize; SWAPCHAIN_LEN],
    current: usize,
    history: VecDeque<Region<Physical>>,
    pending: Region<Physical>,
    in_flight: Option<Region<Physical>>,
    scanned_out: Option<BufferId>,
    presentations: Vec<Presentation>,
    pub hardware_cursor: bool,
    pub cursor_locks: u32,
    pub reject_scanout: bool,
}

impl HeadlessDisplay {
    pub fn new(
        name: impl Into<String>,
        size: Size<i32, Physical>,
        refresh: Duration,
        renderer: SharedRenderer,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            refresh,
            renderer,
            swapchain: [None, None],
            ages: [0; SWAPCHAIN_LEN],
            current: 0,
            history: VecDeque::with_capacity(DAMAGE_HISTORY_LEN),
            pending: Region::new(),
            in_flight: None,
            scanned_out: None,
            presentations: Vec::new(),
            hardware_cursor: true,
            cursor_locks: 0,
            reject_scanout: false,
        }
    }

    pub fn presentations(&self) -> &[Presentation] {
        &self.presentations
    }

    pub fn last_presentation(&self) -> Option<&Presentation> {
        self.presentations.last()
    }

    pub fn front_buffer(&self) -> Option<BufferId> {
        match self.presentations.last()? {
            Presentation::Composited { buffer, .. } | Presentation::Scanout { buffer } => {
                Some(*buffer)
            }
        }
    }

    pub fn pending_damage(&self) -> &Region<Physical> {
        &self.pending
    }

    fn extent(&self) -> Rectangle<i32, Physical> {
        Rectangle::from_size(self.size)
    }

    fn invalidate_ages(&mut self) {
        self.ages = [0; SWAPCHAIN_LEN];
        self.history.clear();
    }
}

impl DisplayBackend for HeadlessDisplay {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn mode_size(&self) -> Size<i32, Physical> {
        self.size
    }

    fn refresh_interval(&self) -> Duration {
        self.refresh
    }

    fn add_damage(&mut self, damage: &Region<Physical>) {
        let clipped = damage.intersect_rect(self.extent());
        self.pending.union(&clipped);
    }

    fn begin_frame(&mut self) -> Result<FrameStart> {
        if let Some(previous) = self.in_flight.take() {
            tracing::warn!(output = %self.name, "frame started twice, rolling back the first one");
            self.pending.union(&previous);
        }

        let slot = self.current;
        let buffer = match &self.swapchain[slot] {
            Some(buffer) => buffer.id(),
            None => {
                let buffer = GpuBuffer::allocate(&self.renderer, self.size)?;
                let id = buffer.id();
                self.swapchain[slot] = Some(buffer);
                self.ages[slot] = 0;
                id
            }
        };

        let damage = std::mem::take(&mut self.pending);
        let needs_swap = !damage.is_empty();
        let age = self.ages[slot];
        let mut buffer_damage = damage.clone();
        if age == 0 || age - 1 > self.history.len() {
            buffer_damage.add_rect(self.extent());
        } else {
            for previous in self.history.iter().take(age - 1) {
                buffer_damage.union(previous);
            }
        }

        self.in_flight = Some(damage);
        Ok(FrameStart {
            buffer,
            size: self.size,
            needs_swap,
            buffer_damage,
        })
    }

    fn rollback(&mut self) {
        if let Some(damage) = self.in_flight.take() {
            self.pending.union(&damage);
        }
    }

    fn commit(&mut self, damage: &Region<Buffer>) -> Result<()> {
        let frame_damage = self.in_flight.take().unwrap_or_default();
        let slot = self.current;
        let buffer = self.swapchain[slot]
            .as_ref()
            .map(GpuBuffer::id)
            .ok_or_else(|| crate::RenderError::Backend("commit without a rendered buffer".into()))?;

        self.history.push_front(frame_damage);
        self.history.truncate(DAMAGE_HISTORY_LEN);
        for age in &mut self.ages {
            if *age > 0 {
                *age += 1;
            }
        }
        self.ages[slot] = 1;
        self.current = (slot + 1) % SWAPCHAIN_LEN;
        self.scanned_out = None;
        self.presentations.push(Presentation::Composited {
            buffer,
            damage: damage.clone(),
        });
        tracing::trace!(output = %self.name, ?buffer, "committed frame");
        Ok(())
    }

    fn attach_scanout(&mut self, buffer: BufferId) -> bool {
        if self.reject_scanout {
            return false;
        }
        // Our swapchain no longer matches what is on screen.
        self.invalidate_ages();
        self.pending.clear();
        self.scanned_out = Some(buffer);
        self.presentations.push(Presentation::Scanout { buffer });
        true
    }

    fn software_cursor_locks(&self) -> u32 {
        self.cursor_locks
    }

    fn hardware_cursor(&self) -> bool {
        self.hardware_cursor
    }
}
