use thiserror::Error;

use crate::backend::BufferId;

/// Errors raised by the render core and its backends.
///
/// None of these ever escape the frame path: `RenderManager` logs them and
/// abandons the current frame.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferId),

    #[error("no render target is bound")]
    NotBound,

    #[error("event loop error: {0}")]
    EventLoop(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_loop_errors_keep_the_source_message() {
        let err = RenderError::EventLoop("timer wheel is full".into());
        assert_eq!(err.to_string(), "event loop error: timer wheel is full");
    }
}
