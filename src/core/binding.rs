use std::ffi::CString;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::callbacks::{with_frontend_installed, CallbackTable};
use super::{CoreInfo, CoreInterface};
use crate::abi;
use crate::audio::{sample_rate_hz, NullDriver};
use crate::error::{Result, RuntimeError};
use crate::frontend::Frontend;
use crate::video::FrameGeometry;

/// Content handed to the core, kept alive until it is unloaded.
#[derive(Debug)]
pub struct ContentSession {
    path: PathBuf,
    // The core may hold on to both pointers until `retro_unload_game`.
    _c_path: CString,
    data: Option<Vec<u8>>,
    size: usize,
    av_info: abi::SystemAvInfo,
}

impl ContentSession {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the bytes were read by the host rather than by the core.
    pub fn in_memory(&self) -> bool {
        self.data.is_some()
    }

    pub fn av_info(&self) -> abi::SystemAvInfo {
        self.av_info
    }
}

/// A bound, initialised core.
///
/// `deinit` runs only if `init` ran, content is unloaded only if it was
/// accepted, and both happen at most once whether [`LoadedCore::unload`] is
/// called explicitly or the value is dropped.
pub struct LoadedCore<C: CoreInterface> {
    core: Option<C>,
    info: CoreInfo,
    initialized: bool,
    content: Option<ContentSession>,
}

impl<C: CoreInterface> LoadedCore<C> {
    /// Installs the host callbacks, then initialises the core.
    ///
    /// The frontend stays installed for the whole handshake: cores issue
    /// environment queries from the callback setters as well as from init.
    pub fn bind(mut core: C, frontend: &mut Frontend) -> Self {
        let (api_version, info) = with_frontend_installed(frontend, || {
            core.install_callbacks(&CallbackTable::host());
            core.init();
            (core.api_version(), CoreInfo::query(&core))
        });

        if api_version != abi::API_VERSION {
            warn!(
                "core reports API version {api_version}, host speaks {}",
                abi::API_VERSION
            );
        }
        info!(
            "core loaded: {} {} (api {api_version})",
            info.library_name, info.library_version
        );
        if !info.valid_extensions.is_empty() {
            debug!("core accepts: {}", info.valid_extensions.join(", "));
        }

        Self {
            core: Some(core),
            info,
            initialized: true,
            content: None,
        }
    }

    /// Hands `path` to the core and configures video and audio for it.
    pub fn load_content(&mut self, path: &Path, frontend: &mut Frontend) -> Result<&ContentSession> {
        let Some(core) = self.core.as_mut() else {
            warn!("content offered to a core that was already unloaded");
            return Err(RuntimeError::ContentRejected {
                path: path.to_path_buf(),
            });
        };
        if self.content.is_some() {
            debug!("replacing loaded content");
            with_frontend_installed(frontend, || core.unload_game());
            self.content = None;
        }

        let read_failed = |source: io::Error| RuntimeError::ContentRead {
            path: path.to_path_buf(),
            source,
        };
        let mut file = File::open(path).map_err(read_failed)?;
        let size = usize::try_from(file.metadata().map_err(read_failed)?.len())
            .map_err(|err| read_failed(io::Error::new(io::ErrorKind::InvalidData, err)))?;

        let data = if self.info.need_fullpath {
            None
        } else {
            let mut buf = Vec::new();
            buf.try_reserve_exact(size)
                .map_err(|err| read_failed(io::Error::new(io::ErrorKind::OutOfMemory, err)))?;
            buf.resize(size, 0);
            file.read_exact(&mut buf).map_err(read_failed)?;
            Some(buf)
        };
        let c_path = CString::new(path.to_string_lossy().into_owned())
            .map_err(|err| read_failed(io::Error::new(io::ErrorKind::InvalidInput, err)))?;

        let game = abi::GameInfo {
            path: c_path.as_ptr(),
            data: data
                .as_ref()
                .map_or(std::ptr::null(), |bytes| bytes.as_ptr().cast()),
            size,
            meta: std::ptr::null(),
        };
        if !with_frontend_installed(frontend, || core.load_game(&game)) {
            return Err(RuntimeError::ContentRejected {
                path: path.to_path_buf(),
            });
        }

        let av_info = with_frontend_installed(frontend, || core.av_info());
        info!(
            "content loaded: {} ({size} bytes, {})",
            path.display(),
            if data.is_some() { "in memory" } else { "by path" }
        );
        let session = self.content.insert(ContentSession {
            path: path.to_path_buf(),
            _c_path: c_path,
            data,
            size,
            av_info,
        });

        frontend
            .video
            .configure(FrameGeometry::from(av_info.geometry))?;
        debug!(
            "core timing: {:.3} fps, {:.1} Hz",
            av_info.timing.fps, av_info.timing.sample_rate
        );
        match sample_rate_hz(av_info.timing.sample_rate) {
            Some(rate) => {
                frontend.audio.open(rate);
            }
            None => warn!(
                "core reported sample rate {}; audio disabled",
                av_info.timing.sample_rate
            ),
        }

        Ok(session)
    }

    /// Steps the core by one frame.
    pub fn run_frame(&mut self, frontend: &mut Frontend) {
        if let Some(core) = self.core.as_mut() {
            with_frontend_installed(frontend, || core.run());
        }
    }

    pub fn reset(&mut self, frontend: &mut Frontend) {
        if let Some(core) = self.core.as_mut() {
            with_frontend_installed(frontend, || core.reset());
        }
    }

    pub fn set_controller_port_device(&mut self, port: u32, device: u32, frontend: &mut Frontend) {
        if let Some(core) = self.core.as_mut() {
            with_frontend_installed(frontend, || core.set_controller_port_device(port, device));
        }
    }

    /// Unloads content, deinitialises and releases the core; later calls do nothing.
    pub fn unload(&mut self, frontend: &mut Frontend) {
        let Some(mut core) = self.core.take() else {
            return;
        };
        let had_content = self.content.is_some();
        let initialized = std::mem::take(&mut self.initialized);
        with_frontend_installed(frontend, || {
            if had_content {
                core.unload_game();
            }
            if initialized {
                core.deinit();
            }
        });
        self.content = None;
        drop(core);
        info!("core unloaded");
    }

    pub fn info(&self) -> &CoreInfo {
        &self.info
    }

    pub fn content(&self) -> Option<&ContentSession> {
        self.content.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_loaded(&self) -> bool {
        self.core.is_some()
    }
}

impl<C: CoreInterface> Drop for LoadedCore<C> {
    fn drop(&mut self) {
        if self.core.is_none() {
            return;
        }
        debug!("core dropped without an explicit unload");
        // Teardown callbacks still need a frontend to land on.
        let mut detached = Frontend::new(1, Box::new(NullDriver));
        self.unload(&mut detached);
    }
}

impl<C: CoreInterface> std::fmt::Debug for LoadedCore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedCore")
            .field("info", &self.info)
            .field("loaded", &self.core.is_some())
            .field("initialized", &self.initialized)
            .field("content", &self.content)
            .finish()
    }
}
