//! A minimal host for libretro-style emulator cores.
//!
//! The crate loads a core from a shared library, answers its environment
//! queries, accepts its video frames and audio samples through the plugin
//! callbacks, and drives a vsync-paced loop that steps the core and presents
//! its output. The window and audio device are behind small traits so the
//! same loop runs headless in tests.

pub mod abi;
pub mod app;
pub mod audio;
pub mod config;
pub mod core;
pub mod driver;
pub mod environment;
pub mod error;
pub mod frontend;
pub mod render;
pub mod video;

pub use app::WindowPlatform;
pub use audio::{AudioBackend, AudioDriver, AudioSink, AudioSpec, AudioStats, CpalDriver, NullDriver};
pub use config::RuntimeConfig;
pub use crate::core::{CallbackTable, ContentSession, CoreInfo, CoreInterface, DynamicCore, LoadedCore};
pub use driver::{HeadlessPlatform, LoopState, Platform, SessionStats};
pub use error::{Result, RuntimeError};
pub use frontend::Frontend;
pub use render::Presenter;
pub use video::{FrameGeometry, PixelFormat, PresentFrame, VideoSurface};
