use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while binding a core, loading content or driving the frame loop.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to load core {}: {message}", path.display())]
    ModuleLoad { path: PathBuf, message: String },

    #[error("core is missing mandatory entry point `{symbol}`: {message}")]
    SymbolResolution {
        symbol: &'static str,
        message: String,
    },

    #[error("cannot read content {}: {source}", path.display())]
    ContentRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("core rejected content {}", path.display())]
    ContentRejected { path: PathBuf },

    #[error("failed to allocate a {width}x{height} video surface")]
    SurfaceAllocation { width: u32, height: u32 },

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("unsupported pixel format {0}")]
    UnsupportedPixelFormat(u32),

    #[error("pixel format cannot change once the video surface is allocated")]
    PixelFormatLocked,

    #[error("video surface is not configured")]
    SurfaceUnconfigured,

    #[error("frame {width}x{height} exceeds the {tex_w}x{tex_h} backing store")]
    FrameTooLarge {
        width: u32,
        height: u32,
        tex_w: u32,
        tex_h: u32,
    },

    #[error("invalid frame {width}x{height} with pitch {pitch}")]
    InvalidFrame { width: u32, height: u32, pitch: usize },

    #[error("platform error: {0}")]
    Platform(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

impl RuntimeError {
    /// Process exit status for a failure that ends the invocation.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
