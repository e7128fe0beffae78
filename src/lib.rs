pub mod backend;
pub mod config;
pub mod cursor;
pub mod damage;
pub mod depth_pool;
pub mod errors;
pub mod hooks;
pub mod host;
pub mod postprocess;
pub mod redraw;
pub mod region;
pub mod render_manager;
pub mod repaint_delay;
pub mod scene;
pub mod stream;
pub mod view;

pub use errors::{RenderError, Result};
pub use render_manager::RenderManager;
