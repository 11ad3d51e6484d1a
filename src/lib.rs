// src/lib.rs
//! Slop render core: deferred render commands, shader reflection and
//! materials for a single render thread.
//!
//! - `command_buffer` / `renderer` / `render_thread`: per-frame FIFO of
//!   render commands, the context that owns it and the thread that drains it
//! - `shader`: `#type` preprocessing, uniform reflection, binding resolution
//!   and hot reload
//! - `materials`: material values packed to the reflected layout, with
//!   per-object instances
//! - `gpu`: the backend boundary plus a recording backend for headless use

pub mod buffer;
pub mod command_buffer;
pub mod context;
pub mod error;
pub mod gpu;
pub mod logging;
pub mod materials;
pub mod render_thread;
pub mod renderer;
pub mod shader;
pub mod texture;

pub use buffer::ByteBuffer;
pub use command_buffer::{CommandQueue, MetricsSnapshot, OverflowPolicy};
pub use error::{Error, Result};
pub use gpu::{RenderBackend, UniformValue};
pub use logging::{init_logging, LoggingConfig};
pub use materials::{Material, MaterialFlags, MaterialInstance};
pub use render_thread::RenderThread;
pub use renderer::{RenderContext, RendererConfig};
pub use shader::{Shader, ShaderLibrary};
pub use texture::{Texture, Texture2D, TextureCube};
