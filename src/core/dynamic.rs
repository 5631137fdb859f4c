use std::ffi::c_uint;
use std::path::{Path, PathBuf};

use libloading::Library;
use log::debug;

use super::{CallbackTable, CoreInterface};
use crate::abi::{self, symbols};
use crate::error::{Result, RuntimeError};

/// Resolved entry points of an opened core module.
struct EntryPoints {
    init: unsafe extern "C" fn(),
    deinit: unsafe extern "C" fn(),
    api_version: unsafe extern "C" fn() -> c_uint,
    get_system_info: unsafe extern "C" fn(*mut abi::SystemInfo),
    get_system_av_info: unsafe extern "C" fn(*mut abi::SystemAvInfo),
    set_controller_port_device: unsafe extern "C" fn(c_uint, c_uint),
    reset: unsafe extern "C" fn(),
    run: unsafe extern "C" fn(),
    load_game: unsafe extern "C" fn(*const abi::GameInfo) -> bool,
    unload_game: unsafe extern "C" fn(),
    set_environment: unsafe extern "C" fn(abi::EnvironmentFn),
    set_video_refresh: unsafe extern "C" fn(abi::VideoRefreshFn),
    set_audio_sample: unsafe extern "C" fn(abi::AudioSampleFn),
    set_audio_sample_batch: unsafe extern "C" fn(abi::AudioSampleBatchFn),
    set_input_poll: unsafe extern "C" fn(abi::InputPollFn),
    set_input_state: unsafe extern "C" fn(abi::InputStateFn),
}

impl EntryPoints {
    fn resolve(library: &Library) -> Result<Self> {
        // SAFETY: each type below is the C signature the ABI gives that symbol.
        unsafe {
            Ok(Self {
                init: symbol(library, symbols::INIT)?,
                deinit: symbol(library, symbols::DEINIT)?,
                api_version: symbol(library, symbols::API_VERSION)?,
                get_system_info: symbol(library, symbols::GET_SYSTEM_INFO)?,
                get_system_av_info: symbol(library, symbols::GET_SYSTEM_AV_INFO)?,
                set_controller_port_device: symbol(library, symbols::SET_CONTROLLER_PORT_DEVICE)?,
                reset: symbol(library, symbols::RESET)?,
                run: symbol(library, symbols::RUN)?,
                load_game: symbol(library, symbols::LOAD_GAME)?,
                unload_game: symbol(library, symbols::UNLOAD_GAME)?,
                set_environment: symbol(library, symbols::SET_ENVIRONMENT)?,
                set_video_refresh: symbol(library, symbols::SET_VIDEO_REFRESH)?,
                set_audio_sample: symbol(library, symbols::SET_AUDIO_SAMPLE)?,
                set_audio_sample_batch: symbol(library, symbols::SET_AUDIO_SAMPLE_BATCH)?,
                set_input_poll: symbol(library, symbols::SET_INPUT_POLL)?,
                set_input_state: symbol(library, symbols::SET_INPUT_STATE)?,
            })
        }
    }
}

/// # Safety
/// `T` must match the actual type of the exported symbol.
unsafe fn symbol<T: Copy>(library: &Library, name: &'static str) -> Result<T> {
    let resolved = library
        .get::<T>(name.as_bytes())
        .map_err(|err| RuntimeError::SymbolResolution {
            symbol: name,
            message: err.to_string(),
        })?;
    Ok(*resolved)
}

/// A core loaded from a shared library.
///
/// The library stays mapped until this value drops, so entry points never
/// outlive their module.
pub struct DynamicCore {
    path: PathBuf,
    entry: EntryPoints,
    optional: Vec<&'static str>,
    _library: Library,
}

impl DynamicCore {
    /// Opens the module at `path` and resolves every required entry point.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        // SAFETY: opening runs the module's initialisers; the user chose to trust it.
        let library = unsafe { Library::new(&path) }.map_err(|err| RuntimeError::ModuleLoad {
            path: path.clone(),
            message: err.to_string(),
        })?;
        let entry = EntryPoints::resolve(&library)?;

        let optional: Vec<&'static str> = symbols::OPTIONAL
            .iter()
            .copied()
            // SAFETY: looked up only for presence, never called.
            .filter(|name| unsafe { library.get::<*const ()>(name.as_bytes()) }.is_ok())
            .collect();
        debug!(
            "{} exports {} of {} optional entry points",
            path.display(),
            optional.len(),
            symbols::OPTIONAL.len()
        );

        Ok(Self {
            path,
            entry,
            optional,
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Optional entry points the module exports.
    pub fn optional_symbols(&self) -> &[&'static str] {
        &self.optional
    }
}

impl std::fmt::Debug for DynamicCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicCore")
            .field("path", &self.path)
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}

// SAFETY (all methods below): the entry points were resolved from the library
// this struct keeps alive, with the signatures the ABI defines.
impl CoreInterface for DynamicCore {
    fn api_version(&self) -> u32 {
        unsafe { (self.entry.api_version)() }
    }

    fn install_callbacks(&mut self, callbacks: &CallbackTable) {
        unsafe {
            (self.entry.set_environment)(callbacks.environment);
            (self.entry.set_video_refresh)(callbacks.video_refresh);
            (self.entry.set_audio_sample)(callbacks.audio_sample);
            (self.entry.set_audio_sample_batch)(callbacks.audio_sample_batch);
            (self.entry.set_input_poll)(callbacks.input_poll);
            (self.entry.set_input_state)(callbacks.input_state);
        }
    }

    fn init(&mut self) {
        unsafe { (self.entry.init)() }
    }

    fn deinit(&mut self) {
        unsafe { (self.entry.deinit)() }
    }

    fn system_info(&self) -> abi::SystemInfo {
        let mut info = abi::SystemInfo::default();
        unsafe { (self.entry.get_system_info)(&mut info) };
        info
    }

    fn av_info(&self) -> abi::SystemAvInfo {
        let mut info = abi::SystemAvInfo::default();
        unsafe { (self.entry.get_system_av_info)(&mut info) };
        info
    }

    fn set_controller_port_device(&mut self, port: u32, device: u32) {
        unsafe { (self.entry.set_controller_port_device)(port, device) }
    }

    fn reset(&mut self) {
        unsafe { (self.entry.reset)() }
    }

    fn run(&mut self) {
        unsafe { (self.entry.run)() }
    }

    fn load_game(&mut self, game: &abi::GameInfo) -> bool {
        unsafe { (self.entry.load_game)(game) }
    }

    fn unload_game(&mut self) {
        unsafe { (self.entry.unload_game)() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_module_reports_its_path() {
        let err = DynamicCore::open("/nonexistent/core_libretro.so").unwrap_err();
        match err {
            RuntimeError::ModuleLoad { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/core_libretro.so"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn file_that_is_not_a_library_fails_to_load() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not a shared object").unwrap();
        assert!(matches!(
            DynamicCore::open(file.path()),
            Err(RuntimeError::ModuleLoad { .. })
        ));
    }
}
