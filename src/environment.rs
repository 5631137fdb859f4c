//! Answers to environment queries issued by the core.
//!
//! Only three commands are understood: the log-interface request, the
//! duplicate-frame capability query and pixel-format negotiation. Everything
//! else is refused; cores query optional capabilities and cope with `false`.

use log::{debug, log, warn, Level};

use crate::abi;
use crate::video::{PixelFormat, VideoSurface};

/// A decoded environment command with its typed payload.
#[derive(Debug)]
pub enum EnvironmentRequest<'a> {
    GetLogInterface(&'a mut abi::LogCallback),
    GetCanDupe(&'a mut bool),
    SetPixelFormat(u32),
    /// A known command whose payload pointer was null.
    Malformed(u32),
    Unsupported(u32),
}

/// Dispatches one request, returning whether it was handled.
pub fn negotiate(
    video: &mut VideoSurface,
    log_printf: abi::LogPrintfFn,
    request: EnvironmentRequest<'_>,
) -> bool {
    match request {
        EnvironmentRequest::GetLogInterface(callback) => {
            callback.log = Some(log_printf);
            true
        }
        EnvironmentRequest::GetCanDupe(can_dupe) => {
            *can_dupe = true;
            true
        }
        EnvironmentRequest::SetPixelFormat(code) => {
            match PixelFormat::from_raw(code).and_then(|format| video.set_pixel_format(format)) {
                Ok(()) => true,
                Err(err) => {
                    warn!("pixel format {code} refused: {err}");
                    false
                }
            }
        }
        EnvironmentRequest::Malformed(cmd) => {
            warn!("environment command {cmd} issued with a null payload");
            false
        }
        EnvironmentRequest::Unsupported(cmd) => {
            debug!("unhandled environment command {cmd}");
            false
        }
    }
}

/// Severity attached to a message from the core's log interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreLogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl CoreLogLevel {
    pub fn from_raw(level: u32) -> Self {
        match level {
            abi::log_level::DEBUG => Self::Debug,
            abi::log_level::INFO => Self::Info,
            abi::log_level::WARN => Self::Warn,
            // Anything above the defined range is treated as the highest severity.
            _ => Self::Error,
        }
    }

    /// The core reserves error severity for unrecoverable conditions.
    pub fn is_fatal(self) -> bool {
        self == Self::Error
    }

    fn as_log_level(self) -> Level {
        match self {
            Self::Debug => Level::Debug,
            Self::Info => Level::Info,
            Self::Warn => Level::Warn,
            Self::Error => Level::Error,
        }
    }
}

/// Forwards a core message to the host log. Returns whether it was fatal.
pub fn forward_core_log(level: CoreLogLevel, message: &str) -> bool {
    log!(target: "core", level.as_log_level(), "{}", message.trim_end());
    level.is_fatal()
}

#[cfg(test)]
mod tests {
    use std::ffi::{c_char, c_uint};

    use super::*;
    use crate::video::FrameGeometry;

    unsafe extern "C" fn silent_log(_level: c_uint, _fmt: *const c_char) {}

    fn configured_surface() -> VideoSurface {
        let mut surface = VideoSurface::new(1);
        surface
            .configure(FrameGeometry {
                aspect_ratio: 0.0,
                base_width: 8,
                base_height: 8,
                max_width: 8,
                max_height: 8,
            })
            .unwrap();
        surface
    }

    #[test]
    fn always_grants_duplicate_frames() {
        let mut video = VideoSurface::default();
        let mut can_dupe = false;
        assert!(negotiate(
            &mut video,
            silent_log,
            EnvironmentRequest::GetCanDupe(&mut can_dupe)
        ));
        assert!(can_dupe);
    }

    #[test]
    fn hands_out_log_interface() {
        let mut video = VideoSurface::default();
        let mut callback = abi::LogCallback::default();
        assert!(negotiate(
            &mut video,
            silent_log,
            EnvironmentRequest::GetLogInterface(&mut callback)
        ));
        assert!(callback.log.is_some());
    }

    #[test]
    fn negotiates_supported_formats_before_allocation() {
        let mut video = VideoSurface::default();
        assert!(negotiate(
            &mut video,
            silent_log,
            EnvironmentRequest::SetPixelFormat(abi::pixel_format::RGB565)
        ));
        assert_eq!(video.format(), Some(PixelFormat::Rgb565));
    }

    #[test]
    fn refuses_unknown_pixel_format() {
        let mut video = VideoSurface::default();
        assert!(!negotiate(&mut video, silent_log, EnvironmentRequest::SetPixelFormat(7)));
        assert_eq!(video.format(), None);
    }

    #[test]
    fn refuses_format_change_after_allocation() {
        let mut video = configured_surface();
        assert!(!negotiate(
            &mut video,
            silent_log,
            EnvironmentRequest::SetPixelFormat(abi::pixel_format::XRGB8888)
        ));
        assert_eq!(video.format(), Some(PixelFormat::Xrgb1555));
    }

    #[test]
    fn unknown_and_malformed_commands_are_refused() {
        let mut video = VideoSurface::default();
        assert!(!negotiate(&mut video, silent_log, EnvironmentRequest::Unsupported(52)));
        assert!(!negotiate(&mut video, silent_log, EnvironmentRequest::Malformed(3)));
    }

    #[test]
    fn only_error_severity_is_fatal() {
        assert!(!CoreLogLevel::from_raw(abi::log_level::DEBUG).is_fatal());
        assert!(!CoreLogLevel::from_raw(abi::log_level::INFO).is_fatal());
        assert!(!forward_core_log(CoreLogLevel::Warn, "low battery\n"));
        assert!(CoreLogLevel::from_raw(abi::log_level::ERROR).is_fatal());
        assert!(CoreLogLevel::from_raw(9).is_fatal());
    }
}
