//! Plugin ABI shared between the host and a loaded core.
//!
//! ## Entry points (host -> core)
//! Resolved by symbol name when the module is opened:
//! - lifecycle: `retro_init`, `retro_deinit`, `retro_api_version`
//! - queries: `retro_get_system_info`, `retro_get_system_av_info`
//! - control: `retro_set_controller_port_device`, `retro_reset`, `retro_run`
//! - content: `retro_load_game`, `retro_unload_game`
//! - callback setters: `retro_set_environment`, `retro_set_video_refresh`,
//!   `retro_set_audio_sample`, `retro_set_audio_sample_batch`,
//!   `retro_set_input_poll`, `retro_set_input_state`
//!
//! ## Callbacks (core -> host)
//! Installed through the setters before `retro_init`. None of them carries a
//! context pointer, which is why the host keeps one thread-scoped binding
//! context (see `crate::core::callbacks`).
//!
//! All layouts here are `#[repr(C)]` and must match the C declarations exactly.

use std::ffi::{c_char, c_uint, c_void};

/// ABI revision this host speaks.
pub const API_VERSION: c_uint = 1;

/// Environment command codes understood by the host.
///
/// Anything else is answered with `false`.
pub mod environment {
    use std::ffi::c_uint;

    /// `bool *` out: whether the core may pass a null frame to repeat the last one.
    pub const GET_CAN_DUPE: c_uint = 3;
    /// `const enum retro_pixel_format *` in.
    pub const SET_PIXEL_FORMAT: c_uint = 10;
    /// `struct retro_log_callback *` out.
    pub const GET_LOG_INTERFACE: c_uint = 27;
}

/// Pixel format codes accepted by `environment::SET_PIXEL_FORMAT`.
pub mod pixel_format {
    use std::ffi::c_uint;

    pub const XRGB1555: c_uint = 0;
    pub const XRGB8888: c_uint = 1;
    pub const RGB565: c_uint = 2;
}

/// Severity levels passed to the log callback.
pub mod log_level {
    use std::ffi::c_uint;

    pub const DEBUG: c_uint = 0;
    pub const INFO: c_uint = 1;
    pub const WARN: c_uint = 2;
    pub const ERROR: c_uint = 3;
}

/// Exported symbol names.
pub mod symbols {
    pub const INIT: &str = "retro_init";
    pub const DEINIT: &str = "retro_deinit";
    pub const API_VERSION: &str = "retro_api_version";
    pub const GET_SYSTEM_INFO: &str = "retro_get_system_info";
    pub const GET_SYSTEM_AV_INFO: &str = "retro_get_system_av_info";
    pub const SET_CONTROLLER_PORT_DEVICE: &str = "retro_set_controller_port_device";
    pub const RESET: &str = "retro_reset";
    pub const RUN: &str = "retro_run";
    pub const LOAD_GAME: &str = "retro_load_game";
    pub const UNLOAD_GAME: &str = "retro_unload_game";

    pub const SET_ENVIRONMENT: &str = "retro_set_environment";
    pub const SET_VIDEO_REFRESH: &str = "retro_set_video_refresh";
    pub const SET_AUDIO_SAMPLE: &str = "retro_set_audio_sample";
    pub const SET_AUDIO_SAMPLE_BATCH: &str = "retro_set_audio_sample_batch";
    pub const SET_INPUT_POLL: &str = "retro_set_input_poll";
    pub const SET_INPUT_STATE: &str = "retro_set_input_state";

    /// Entry points the host never calls; looked up only so their absence is tolerated.
    pub const OPTIONAL: &[&str] = &[
        "retro_serialize_size",
        "retro_serialize",
        "retro_unserialize",
        "retro_cheat_reset",
        "retro_cheat_set",
        "retro_load_game_special",
        "retro_get_region",
        "retro_get_memory_data",
        "retro_get_memory_size",
    ];
}

pub type EnvironmentFn = unsafe extern "C" fn(cmd: c_uint, data: *mut c_void) -> bool;
pub type VideoRefreshFn =
    unsafe extern "C" fn(data: *const c_void, width: c_uint, height: c_uint, pitch: usize);
pub type AudioSampleFn = unsafe extern "C" fn(left: i16, right: i16);
pub type AudioSampleBatchFn = unsafe extern "C" fn(data: *const i16, frames: usize) -> usize;
pub type InputPollFn = unsafe extern "C" fn();
pub type InputStateFn =
    unsafe extern "C" fn(port: c_uint, device: c_uint, index: c_uint, id: c_uint) -> i16;

/// Log callback handed out through `environment::GET_LOG_INTERFACE`.
///
/// The C declaration is variadic (`level, fmt, ...`). Stable Rust cannot define
/// variadic functions, so the host callback reads the two fixed arguments only.
pub type LogPrintfFn = unsafe extern "C" fn(level: c_uint, fmt: *const c_char);

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCallback {
    pub log: Option<LogPrintfFn>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SystemInfo {
    pub library_name: *const c_char,
    pub library_version: *const c_char,
    pub valid_extensions: *const c_char,
    pub need_fullpath: bool,
    pub block_extract: bool,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            library_name: std::ptr::null(),
            library_version: std::ptr::null(),
            valid_extensions: std::ptr::null(),
            need_fullpath: false,
            block_extract: false,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GameGeometry {
    pub base_width: c_uint,
    pub base_height: c_uint,
    pub max_width: c_uint,
    pub max_height: c_uint,
    pub aspect_ratio: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemTiming {
    pub fps: f64,
    pub sample_rate: f64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemAvInfo {
    pub geometry: GameGeometry,
    pub timing: SystemTiming,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GameInfo {
    pub path: *const c_char,
    pub data: *const c_void,
    pub size: usize,
    pub meta: *const c_char,
}
