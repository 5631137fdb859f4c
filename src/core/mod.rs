//! Binding to an emulator core.
//!
//! [`CoreInterface`] is the capability set the host drives. [`DynamicCore`]
//! implements it over a shared library opened at runtime; tests implement it
//! directly. [`LoadedCore`] owns a core for the length of a session and makes
//! sure init/deinit and load/unload stay paired.

mod binding;
pub mod callbacks;
mod dynamic;

use std::ffi::{c_char, CStr};

use crate::abi;

pub use binding::{ContentSession, LoadedCore};
pub use callbacks::CallbackTable;
pub use dynamic::DynamicCore;

/// Entry points the host calls on a core.
pub trait CoreInterface {
    fn api_version(&self) -> u32;

    /// Registers the host callbacks. Called once, before [`CoreInterface::init`].
    fn install_callbacks(&mut self, callbacks: &CallbackTable);

    fn init(&mut self);

    fn deinit(&mut self);

    fn system_info(&self) -> abi::SystemInfo;

    fn av_info(&self) -> abi::SystemAvInfo;

    fn set_controller_port_device(&mut self, port: u32, device: u32);

    fn reset(&mut self);

    /// Emulates one frame, calling back into the host for video and audio.
    fn run(&mut self);

    fn load_game(&mut self, game: &abi::GameInfo) -> bool;

    fn unload_game(&mut self);
}

/// Owned copy of a core's static description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreInfo {
    pub library_name: String,
    pub library_version: String,
    pub valid_extensions: Vec<String>,
    /// The core reads content from disk itself and wants only the path.
    pub need_fullpath: bool,
    pub block_extract: bool,
}

impl CoreInfo {
    /// Copies the strings out of a raw description.
    ///
    /// # Safety
    /// Every non-null string pointer in `raw` must be NUL-terminated and valid.
    pub unsafe fn from_raw(raw: &abi::SystemInfo) -> Self {
        let extensions = owned_string(raw.valid_extensions);
        Self {
            library_name: owned_string(raw.library_name),
            library_version: owned_string(raw.library_version),
            valid_extensions: extensions
                .split('|')
                .filter(|ext| !ext.is_empty())
                .map(str::to_owned)
                .collect(),
            need_fullpath: raw.need_fullpath,
            block_extract: raw.block_extract,
        }
    }

    /// Queries `core` and copies the result.
    pub fn query(core: &impl CoreInterface) -> Self {
        let raw = core.system_info();
        // SAFETY: cores return static strings from `retro_get_system_info`.
        unsafe { Self::from_raw(&raw) }
    }
}

unsafe fn owned_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_info_is_copied_and_split() {
        let raw = abi::SystemInfo {
            library_name: c"snes9x".as_ptr(),
            library_version: c"1.62".as_ptr(),
            valid_extensions: c"smc|sfc||fig".as_ptr(),
            need_fullpath: false,
            block_extract: true,
        };
        let info = unsafe { CoreInfo::from_raw(&raw) };
        assert_eq!(info.library_name, "snes9x");
        assert_eq!(info.library_version, "1.62");
        assert_eq!(info.valid_extensions, ["smc", "sfc", "fig"]);
        assert!(info.block_extract);
    }

    #[test]
    fn null_strings_become_empty() {
        let info = unsafe { CoreInfo::from_raw(&abi::SystemInfo::default()) };
        assert_eq!(info, CoreInfo::default());
    }
}
