//! `swfb-d3d9` presents a software-rendered frame through a Direct3D 9 style device.
//!
//! The crate provides:
//! - The [`Device`] abstraction the presenter drives, plus a deterministic in-memory
//!   implementation for tests (see [`headless`]).
//! - Device creation with vertex-processing and refresh-rate fallback, and per-frame
//!   device-loss recovery (see [`recovery`]).
//! - The [`Framebuffer`] pipeline: palette and gamma handling, letterboxing, windowed
//!   render-texture compositing and presentation.
//! - A 2D draw-list renderer and a quad batcher for screen wipes, on top of a redundant
//!   state filter (see [`state::StateCache`]).
//! - Native mirrors of engine textures and translation tables (see
//!   [`resources::native`]).

mod canvas;
mod config;
mod error;
mod platform;

pub mod device;
pub mod frame;
pub mod headless;
pub mod palette;
pub mod recovery;
pub mod resources;
pub mod shaders;
pub mod state;
pub mod stats;

pub use canvas::Canvas;
pub use config::{DisplayMode, FramebufferConfig};
pub use device::{Device, DeviceFactory};
pub use error::{CreationAttempt, DeviceError, FatalError, InitError, ResourceError};
pub use frame::draw2d::{DrawCommand, DrawFlags, DrawList, DrawType, Vertex2D};
pub use frame::quad_batch::{BatchedQuad, QuadBatch};
pub use frame::{Framebuffer, Mode2D, ScreenshotBuffer, ScreenshotFormat, SpecialColormap};
pub use palette::PalEntry;
pub use platform::Platform;
pub use stats::{FrameStats, FrameStatsSnapshot};
