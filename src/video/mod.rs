//! Video surface management.
//!
//! The surface owns the backing store a core renders into: a `tex_w` x `tex_h`
//! buffer sized from the geometry's declared maximum, of which only the clip
//! region (`clip_w` x `clip_h`) holds the latest frame. The presenter samples
//! the clip region through [`TexCoords`] so padding never becomes visible.
//!
//! Lifecycle: *Unconfigured* -> *Configured* (re-entrant per frame) -> *Destroyed*.
//! The pixel format may only be negotiated while no backing store exists.

mod pixel;

use log::{debug, info, trace, warn};

use crate::abi;
use crate::error::{Result, RuntimeError};

pub use pixel::{convert_to_rgba, Channel, PixelFormat, PixelLayout};

/// Integer multiplier applied to the fitted display size.
pub const DEFAULT_SCALE: u32 = 3;

/// Largest multiplier the command line accepts.
pub const MAX_SCALE: u32 = 16;

/// Format used when the core never negotiates one.
pub const DEFAULT_PIXEL_FORMAT: PixelFormat = PixelFormat::Xrgb1555;

/// Frame geometry reported by the core.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    /// Display aspect ratio; zero or negative means "derive from base size".
    pub aspect_ratio: f32,
    pub base_width: u32,
    pub base_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl From<abi::GameGeometry> for FrameGeometry {
    fn from(geometry: abi::GameGeometry) -> Self {
        Self {
            aspect_ratio: geometry.aspect_ratio,
            base_width: geometry.base_width,
            base_height: geometry.base_height,
            max_width: geometry.max_width,
            max_height: geometry.max_height,
        }
    }
}

impl FrameGeometry {
    /// Aspect ratio actually used for display.
    pub fn effective_aspect(&self) -> f64 {
        if self.aspect_ratio <= 0.0 {
            f64::from(self.base_width) / f64::from(self.base_height)
        } else {
            f64::from(self.aspect_ratio)
        }
    }

    /// Fits the base size to the aspect ratio, then applies `scale`.
    pub fn display_size(&self, scale: u32) -> DisplaySize {
        let ratio = self.effective_aspect();
        let mut width = f64::from(self.base_width);
        let mut height = f64::from(self.base_height);

        // Portrait frames keep their height, landscape frames keep their width.
        if width / height < 1.0 {
            width = (height * ratio).round();
        } else {
            height = (width / ratio).round();
        }

        DisplaySize {
            width: (width as u32).saturating_mul(scale),
            height: (height as u32).saturating_mul(scale),
        }
    }
}

/// Window size requested for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

/// Normalised extent of the clip region inside the backing store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexCoords {
    pub u_max: f32,
    pub v_max: f32,
}

impl TexCoords {
    pub const FULL: TexCoords = TexCoords {
        u_max: 1.0,
        v_max: 1.0,
    };

    fn for_clip(clip_w: u32, clip_h: u32, tex_w: u32, tex_h: u32) -> Self {
        Self {
            u_max: clip_w as f32 / tex_w as f32,
            v_max: clip_h as f32 / tex_h as f32,
        }
    }
}

/// Identity of one backing-store allocation; changes every time it is recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Unconfigured,
    Configured,
    Destroyed,
}

#[derive(Debug)]
struct Backing {
    id: TextureId,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Backing {
    fn allocate(id: TextureId, width: u32, height: u32, bpp: usize) -> Result<Self> {
        let failed = || RuntimeError::SurfaceAllocation { width, height };
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(bpp))
            .ok_or_else(failed)?;
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(len).map_err(|_| failed())?;
        pixels.resize(len, 0);
        Ok(Self {
            id,
            width,
            height,
            pixels,
        })
    }
}

/// Everything the presenter needs to draw the current frame.
#[derive(Debug)]
pub struct PresentFrame<'a> {
    pub texture: TextureId,
    pub format: PixelFormat,
    pub tex_width: u32,
    pub tex_height: u32,
    pub clip_width: u32,
    pub clip_height: u32,
    pub tex_coords: TexCoords,
    /// Whole backing store, rows `stride` bytes apart.
    pub pixels: &'a [u8],
    pub stride: usize,
    /// Whether pixels changed since the previous present.
    pub dirty: bool,
    /// Window size to apply before drawing, set after a (re)configuration.
    pub resize: Option<DisplaySize>,
}

/// Presentation texture state driven by core configuration and refresh calls.
#[derive(Debug)]
pub struct VideoSurface {
    scale: u32,
    format: Option<PixelFormat>,
    backing: Option<Backing>,
    clip_w: u32,
    clip_h: u32,
    pitch: usize,
    tex_coords: TexCoords,
    pending_resize: Option<DisplaySize>,
    dirty: bool,
    allocations: u64,
    destroyed: bool,
}

impl Default for VideoSurface {
    fn default() -> Self {
        Self::new(DEFAULT_SCALE)
    }
}

impl VideoSurface {
    pub fn new(scale: u32) -> Self {
        Self {
            scale: scale.max(1),
            format: None,
            backing: None,
            clip_w: 0,
            clip_h: 0,
            pitch: 0,
            tex_coords: TexCoords::FULL,
            pending_resize: None,
            dirty: false,
            allocations: 0,
            destroyed: false,
        }
    }

    pub fn state(&self) -> SurfaceState {
        match (&self.backing, self.destroyed) {
            (Some(_), _) => SurfaceState::Configured,
            (None, true) => SurfaceState::Destroyed,
            (None, false) => SurfaceState::Unconfigured,
        }
    }

    /// Negotiates the pixel format; refused once a backing store exists.
    pub fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()> {
        if self.backing.is_some() {
            return Err(RuntimeError::PixelFormatLocked);
        }
        debug!("pixel format negotiated: {format:?}");
        self.format = Some(format);
        Ok(())
    }

    /// (Re)allocates the backing store for `geometry` and returns the window size to use.
    pub fn configure(&mut self, geometry: FrameGeometry) -> Result<DisplaySize> {
        let FrameGeometry {
            base_width,
            base_height,
            ..
        } = geometry;
        if base_width == 0 || base_height == 0 {
            return Err(RuntimeError::SurfaceAllocation {
                width: geometry.max_width,
                height: geometry.max_height,
            });
        }

        let display = geometry.display_size(self.scale);
        self.release_backing();

        let format = *self.format.get_or_insert(DEFAULT_PIXEL_FORMAT);
        let bpp = format.bytes_per_pixel();

        if geometry.max_width < base_width || geometry.max_height < base_height {
            warn!(
                "core declared max {}x{} below base {}x{}; sizing backing store to fit",
                geometry.max_width, geometry.max_height, base_width, base_height
            );
        }
        let tex_w = geometry.max_width.max(base_width);
        let tex_h = geometry.max_height.max(base_height);

        let id = TextureId(self.allocations + 1);
        let backing = Backing::allocate(id, tex_w, tex_h, bpp)?;
        self.allocations += 1;
        self.backing = Some(backing);
        self.destroyed = false;

        self.pitch = base_width as usize * bpp;
        self.clip_w = base_width;
        self.clip_h = base_height;
        self.tex_coords = TexCoords::for_clip(self.clip_w, self.clip_h, tex_w, tex_h);
        self.pending_resize = Some(display);
        self.dirty = true;

        info!(
            "video configured: {format:?}, backing {tex_w}x{tex_h}, clip {base_width}x{base_height}, window {}x{}",
            display.width, display.height
        );
        Ok(display)
    }

    /// Accepts one frame from the core.
    ///
    /// `None` repeats the previous frame: clip and pitch bookkeeping still
    /// happen but the backing store is left untouched.
    pub fn refresh(
        &mut self,
        data: Option<&[u8]>,
        width: u32,
        height: u32,
        pitch: usize,
    ) -> Result<()> {
        let format = self.format.unwrap_or(DEFAULT_PIXEL_FORMAT);
        let bpp = format.bytes_per_pixel();
        let backing = self
            .backing
            .as_mut()
            .ok_or(RuntimeError::SurfaceUnconfigured)?;

        if width > backing.width || height > backing.height {
            return Err(RuntimeError::FrameTooLarge {
                width,
                height,
                tex_w: backing.width,
                tex_h: backing.height,
            });
        }
        let row_bytes = width as usize * bpp;
        // A repeated frame carries no rows, so its pitch is not checked.
        if width == 0 || height == 0 || (data.is_some() && pitch < row_bytes) {
            return Err(RuntimeError::InvalidFrame {
                width,
                height,
                pitch,
            });
        }

        if width != self.clip_w || height != self.clip_h {
            trace!("clip region now {width}x{height}");
            self.clip_w = width;
            self.clip_h = height;
            self.tex_coords =
                TexCoords::for_clip(width, height, backing.width, backing.height);
        }

        if pitch >= row_bytes && pitch != self.pitch {
            trace!("row pitch now {pitch} bytes");
            self.pitch = pitch;
        }

        let Some(data) = data else {
            return Ok(());
        };

        let needed = (height as usize - 1) * pitch + row_bytes;
        if data.len() < needed {
            return Err(RuntimeError::InvalidFrame {
                width,
                height,
                pitch,
            });
        }

        let stride = backing.width as usize * bpp;
        for (src, dst) in data
            .chunks(pitch)
            .zip(backing.pixels.chunks_mut(stride))
            .take(height as usize)
        {
            dst[..row_bytes].copy_from_slice(&src[..row_bytes]);
        }
        self.dirty = true;
        Ok(())
    }

    /// Hands the current frame to the presenter and clears the dirty flag.
    pub fn present(&mut self) -> Option<PresentFrame<'_>> {
        let format = self.format?;
        let backing = self.backing.as_ref()?;
        let dirty = std::mem::take(&mut self.dirty);
        Some(PresentFrame {
            texture: backing.id,
            format,
            tex_width: backing.width,
            tex_height: backing.height,
            clip_width: self.clip_w,
            clip_height: self.clip_h,
            tex_coords: self.tex_coords,
            pixels: &backing.pixels,
            stride: backing.width as usize * format.bytes_per_pixel(),
            dirty,
            resize: self.pending_resize.take(),
        })
    }

    /// Releases the backing store; safe to call repeatedly.
    pub fn teardown(&mut self) {
        if self.release_backing() {
            debug!("video surface released");
        }
        self.destroyed = true;
    }

    fn release_backing(&mut self) -> bool {
        self.dirty = false;
        self.pending_resize = None;
        self.backing.take().is_some()
    }

    pub fn format(&self) -> Option<PixelFormat> {
        self.format
    }

    /// Bytes per pixel of the active backing store, if one exists.
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        self.backing.as_ref()?;
        self.format.map(PixelFormat::bytes_per_pixel)
    }

    pub fn texture_id(&self) -> Option<TextureId> {
        self.backing.as_ref().map(|backing| backing.id)
    }

    /// Number of backing-store allocations performed so far.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    pub fn tex_size(&self) -> Option<(u32, u32)> {
        self.backing
            .as_ref()
            .map(|backing| (backing.width, backing.height))
    }

    pub fn clip_size(&self) -> (u32, u32) {
        (self.clip_w, self.clip_h)
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn tex_coords(&self) -> TexCoords {
        self.tex_coords
    }

    /// Raw backing store bytes, rows `tex_w * bytes_per_pixel` apart.
    pub fn pixels(&self) -> Option<&[u8]> {
        self.backing.as_ref().map(|backing| backing.pixels.as_slice())
    }
}
