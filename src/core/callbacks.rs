//! Host callbacks installed into the core, and the binding context they use.
//!
//! The callback signatures are fixed by the plugin ABI and carry no user-data
//! pointer. The host therefore keeps exactly one piece of ambient state: a
//! thread-local slot holding the [`Frontend`] for the duration of each call
//! into the core. Outside such a call the slot is empty and callbacks are
//! ignored with a warning. While a callback runs, the slot is emptied so a
//! re-entrant callback cannot alias the frontend.

use std::cell::Cell;
use std::ffi::{c_char, c_uint, c_void, CStr};
use std::ptr::NonNull;
use std::slice;

use log::warn;

use crate::abi;
use crate::audio::CHANNELS;
use crate::environment::{self, CoreLogLevel, EnvironmentRequest};
use crate::frontend::Frontend;

thread_local! {
    static ACTIVE: Cell<Option<NonNull<Frontend>>> = const { Cell::new(None) };
}

/// Puts the slot back to what it held before.
struct Restore(Option<NonNull<Frontend>>);

impl Drop for Restore {
    fn drop(&mut self) {
        ACTIVE.with(|slot| slot.set(self.0));
    }
}

/// Runs `call` with `frontend` reachable from the core's callbacks.
pub(crate) fn with_frontend_installed<R>(frontend: &mut Frontend, call: impl FnOnce() -> R) -> R {
    let previous = ACTIVE.with(|slot| slot.replace(Some(NonNull::from(frontend))));
    let _restore = Restore(previous);
    call()
}

fn dispatch<R>(callback: &str, fallback: R, handle: impl FnOnce(&mut Frontend) -> R) -> R {
    let Some(mut frontend) = ACTIVE.with(Cell::take) else {
        warn!("{callback} callback invoked outside a core call; ignored");
        return fallback;
    };
    let _restore = Restore(Some(frontend));
    // SAFETY: the pointer comes from the exclusive borrow held by
    // `with_frontend_installed` further up this thread's stack, and the slot
    // stays empty until `_restore` drops, so this is the only live reference.
    handle(unsafe { frontend.as_mut() })
}

/// The full set of callbacks registered with a core.
#[derive(Debug, Clone, Copy)]
pub struct CallbackTable {
    pub environment: abi::EnvironmentFn,
    pub video_refresh: abi::VideoRefreshFn,
    pub audio_sample: abi::AudioSampleFn,
    pub audio_sample_batch: abi::AudioSampleBatchFn,
    pub input_poll: abi::InputPollFn,
    pub input_state: abi::InputStateFn,
}

impl CallbackTable {
    /// This host's implementations.
    pub fn host() -> Self {
        Self {
            environment,
            video_refresh,
            audio_sample,
            audio_sample_batch,
            input_poll,
            input_state,
        }
    }
}

/// Log function handed to cores that ask for a log interface.
pub const LOG_PRINTF: abi::LogPrintfFn = core_log;

/// Process exit status after a core reports an error-severity message.
pub const FATAL_LOG_STATUS: i32 = 1;

extern "C" fn core_log(level: c_uint, fmt: *const c_char) {
    if let Some(status) = forward_log_line(level, fmt) {
        log::logger().flush();
        std::process::exit(status);
    }
}

/// Forwards one core log line and returns the exit status if it is fatal.
fn forward_log_line(level: c_uint, fmt: *const c_char) -> Option<i32> {
    if fmt.is_null() {
        return None;
    }
    // SAFETY: the core passes a NUL-terminated format string.
    let message = unsafe { CStr::from_ptr(fmt) }.to_string_lossy();
    environment::forward_core_log(CoreLogLevel::from_raw(level), &message)
        .then_some(FATAL_LOG_STATUS)
}

/// Decodes a raw environment command into a typed request.
///
/// # Safety
/// `data` must be null or point to the payload type the command defines.
unsafe fn decode_environment<'a>(cmd: c_uint, data: *mut c_void) -> EnvironmentRequest<'a> {
    let known = matches!(
        cmd,
        abi::environment::GET_LOG_INTERFACE
            | abi::environment::GET_CAN_DUPE
            | abi::environment::SET_PIXEL_FORMAT
    );
    if known && data.is_null() {
        return EnvironmentRequest::Malformed(cmd);
    }
    match cmd {
        abi::environment::GET_LOG_INTERFACE => {
            EnvironmentRequest::GetLogInterface(&mut *data.cast::<abi::LogCallback>())
        }
        abi::environment::GET_CAN_DUPE => EnvironmentRequest::GetCanDupe(&mut *data.cast::<bool>()),
        abi::environment::SET_PIXEL_FORMAT => {
            EnvironmentRequest::SetPixelFormat(*data.cast::<c_uint>().cast_const())
        }
        other => EnvironmentRequest::Unsupported(other),
    }
}

extern "C" fn environment(cmd: c_uint, data: *mut c_void) -> bool {
    // SAFETY: payload types follow the command codes of the plugin ABI.
    let request = unsafe { decode_environment(cmd, data) };
    dispatch("environment", false, |frontend| {
        environment::negotiate(&mut frontend.video, LOG_PRINTF, request)
    })
}

fn frame_len(width: c_uint, height: c_uint, pitch: usize, bpp: usize) -> usize {
    if height == 0 {
        return 0;
    }
    (height as usize - 1)
        .saturating_mul(pitch)
        .saturating_add((width as usize).saturating_mul(bpp))
}

extern "C" fn video_refresh(data: *const c_void, width: c_uint, height: c_uint, pitch: usize) {
    dispatch("video refresh", (), |frontend| {
        let frame = if data.is_null() {
            None
        } else {
            let Some(bpp) = frontend.video.bytes_per_pixel() else {
                warn!("frame delivered before video was configured; dropped");
                return;
            };
            let len = frame_len(width, height, pitch, bpp);
            // SAFETY: the core hands over `height` rows `pitch` bytes apart,
            // the last one `width` pixels wide, valid until this call returns.
            Some(unsafe { slice::from_raw_parts(data.cast::<u8>(), len) })
        };
        if let Err(err) = frontend.video.refresh(frame, width, height, pitch) {
            warn!("frame dropped: {err}");
        }
    });
}

extern "C" fn audio_sample(left: i16, right: i16) {
    dispatch("audio sample", (), |frontend| {
        frontend.audio.write(&[left, right], 1);
    });
}

extern "C" fn audio_sample_batch(data: *const i16, frames: usize) -> usize {
    if data.is_null() || frames == 0 {
        return 0;
    }
    // SAFETY: the core passes `frames` interleaved stereo frames.
    let samples =
        unsafe { slice::from_raw_parts(data, frames.saturating_mul(usize::from(CHANNELS))) };
    dispatch("audio batch", 0, |frontend| {
        frontend.audio.write(samples, frames)
    })
}

extern "C" fn input_poll() {}

extern "C" fn input_state(_port: c_uint, _device: c_uint, _index: c_uint, _id: c_uint) -> i16 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullDriver;

    #[test]
    fn callbacks_outside_a_core_call_are_ignored() {
        let mut format = abi::pixel_format::RGB565;
        let handled = unsafe {
            (CallbackTable::host().environment)(
                abi::environment::SET_PIXEL_FORMAT,
                (&mut format as *mut c_uint).cast(),
            )
        };
        assert!(!handled);
    }

    #[test]
    fn installed_frontend_is_reachable_then_removed() {
        let mut frontend = Frontend::new(1, Box::new(NullDriver));
        let table = CallbackTable::host();
        let mut can_dupe = false;
        let handled = with_frontend_installed(&mut frontend, || unsafe {
            (table.environment)(
                abi::environment::GET_CAN_DUPE,
                (&mut can_dupe as *mut bool).cast(),
            )
        });
        assert!(handled);
        assert!(can_dupe);
        assert!(ACTIVE.with(Cell::get).is_none());
    }

    #[test]
    fn null_payload_is_refused() {
        let mut frontend = Frontend::new(1, Box::new(NullDriver));
        let table = CallbackTable::host();
        let handled = with_frontend_installed(&mut frontend, || unsafe {
            (table.environment)(abi::environment::GET_CAN_DUPE, std::ptr::null_mut())
        });
        assert!(!handled);
    }

    #[test]
    fn frame_length_covers_last_row_only_up_to_width() {
        assert_eq!(frame_len(4, 3, 16, 2), 2 * 16 + 8);
        assert_eq!(frame_len(4, 0, 16, 2), 0);
    }

    #[test]
    fn only_error_lines_end_the_process() {
        let line = c"disk image looks odd\n".as_ptr();
        assert_eq!(forward_log_line(abi::log_level::DEBUG, line), None);
        assert_eq!(forward_log_line(abi::log_level::WARN, line), None);
        assert_eq!(
            forward_log_line(abi::log_level::ERROR, c"bios missing\n".as_ptr()),
            Some(FATAL_LOG_STATUS)
        );
        assert_eq!(forward_log_line(99, line), Some(FATAL_LOG_STATUS));
        assert_eq!(forward_log_line(abi::log_level::ERROR, std::ptr::null()), None);

        // Non-fatal lines return through the exported pointer.
        unsafe { LOG_PRINTF(abi::log_level::WARN, line) };
    }

    #[test]
    fn single_frames_reach_the_audio_sink() {
        let mut frontend = Frontend::new(1, Box::new(NullDriver));
        assert!(frontend.audio.open(32_000));
        let table = CallbackTable::host();
        with_frontend_installed(&mut frontend, || unsafe {
            (table.audio_sample)(1, -1);
            (table.audio_sample)(2, -2);
        });
        assert_eq!(frontend.audio.stats().frames_written, 2);

        // Outside a core call the frame is ignored.
        unsafe { (table.audio_sample)(3, -3) };
        assert_eq!(frontend.audio.stats().frames_written, 2);
    }

    #[test]
    fn input_stubs_report_nothing_pressed() {
        let table = CallbackTable::host();
        unsafe {
            (table.input_poll)();
            assert_eq!((table.input_state)(0, 1, 0, 8), 0);
        }
    }
}
