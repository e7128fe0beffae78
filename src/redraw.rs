use smithay::reexports::calloop::RegistrationToken;

/// Where an output is in its refresh cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum RedrawState {
    #[default]
    Idle,
    /// A frame-ready callback is pending.
    Queued,
    /// The repaint delay timer is armed.
    WaitingForRepaintDelay(RegistrationToken),
    /// A frame was submitted and its vblank has not arrived yet.
    WaitingForVBlank { redraw_needed: bool },
}

impl RedrawState {
    pub fn queue_redraw(self) -> Self {
        match self {
            RedrawState::Idle => RedrawState::Queued,
            RedrawState::WaitingForVBlank { .. } => RedrawState::WaitingForVBlank {
                redraw_needed: true,
            },
            value @ (RedrawState::Queued | RedrawState::WaitingForRepaintDelay(_)) => value,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, RedrawState::Idle)
    }
}
