//! Audio sink for PCM produced by the core.
//!
//! Samples are always interleaved stereo `i16`. Audio is best-effort: a device
//! that fails to open leaves the sink closed and the session running, and a
//! device error during a write is recovered in place and reported as zero
//! frames written for that call.

mod device;
mod resample;

use log::{debug, info, warn};

use crate::error::Result;

pub use device::CpalDriver;

/// Interleaved channels per frame.
pub const CHANNELS: u16 = 2;

/// Buffering latency target for the playback device.
pub const LATENCY_MS: u32 = 64;

/// Playback parameters for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub latency_ms: u32,
}

impl AudioSpec {
    pub fn stereo(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: CHANNELS,
            latency_ms: LATENCY_MS,
        }
    }

    /// Interleaved samples covering the latency target.
    pub fn buffer_samples(&self) -> usize {
        let frames = (u64::from(self.sample_rate) * u64::from(self.latency_ms) / 1000) as usize;
        frames.max(1) * usize::from(self.channels)
    }
}

/// An open playback device.
pub trait AudioBackend {
    /// Writes interleaved samples, returning the number of whole frames accepted.
    fn write(&mut self, samples: &[i16]) -> Result<usize>;

    /// Brings the device back to a playable state after a write error.
    fn recover(&mut self) -> Result<()>;
}

/// Opens playback devices.
pub trait AudioDriver {
    fn name(&self) -> &str;

    fn open(&self, spec: &AudioSpec) -> Result<Box<dyn AudioBackend>>;
}

/// Driver whose devices accept and discard every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDriver;

impl AudioDriver for NullDriver {
    fn name(&self) -> &str {
        "null"
    }

    fn open(&self, _spec: &AudioSpec) -> Result<Box<dyn AudioBackend>> {
        Ok(Box::new(NullBackend))
    }
}

struct NullBackend;

impl AudioBackend for NullBackend {
    fn write(&mut self, samples: &[i16]) -> Result<usize> {
        Ok(samples.len() / usize::from(CHANNELS))
    }

    fn recover(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Counters reported when a session ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AudioStats {
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub device_errors: u64,
}

/// Session-scoped audio output.
pub struct AudioSink {
    driver: Box<dyn AudioDriver>,
    device: Option<Box<dyn AudioBackend>>,
    spec: Option<AudioSpec>,
    stats: AudioStats,
}

impl AudioSink {
    pub fn new(driver: Box<dyn AudioDriver>) -> Self {
        Self {
            driver,
            device: None,
            spec: None,
            stats: AudioStats::default(),
        }
    }

    /// Opens the playback device; failure is reported and leaves the sink closed.
    pub fn open(&mut self, sample_rate: u32) -> bool {
        if self.device.is_some() {
            debug!("audio device already open; closing before reopening");
            self.close();
        }

        let spec = AudioSpec::stereo(sample_rate);
        match self.driver.open(&spec) {
            Ok(device) => {
                info!(
                    "audio opened via {}: {} Hz, {} channels, {} ms latency",
                    self.driver.name(),
                    spec.sample_rate,
                    spec.channels,
                    spec.latency_ms
                );
                self.device = Some(device);
                self.spec = Some(spec);
                true
            }
            Err(err) => {
                warn!("audio disabled: {err}");
                false
            }
        }
    }

    /// Writes `frames` interleaved stereo frames from `samples`.
    pub fn write(&mut self, samples: &[i16], frames: usize) -> usize {
        let len = frames.saturating_mul(usize::from(CHANNELS)).min(samples.len());
        let samples = &samples[..len];
        let frames = len / usize::from(CHANNELS);

        let Some(device) = self.device.as_mut() else {
            self.stats.frames_dropped += frames as u64;
            return frames;
        };

        match device.write(samples) {
            Ok(written) => {
                self.stats.frames_written += written as u64;
                written
            }
            Err(err) => {
                self.stats.device_errors += 1;
                warn!("audio write failed: {err}");
                if let Err(err) = device.recover() {
                    warn!("audio device recovery failed: {err}");
                }
                0
            }
        }
    }

    /// Releases the device; safe to call when nothing is open.
    pub fn close(&mut self) {
        if self.device.take().is_some() {
            debug!("audio device closed");
        }
        self.spec = None;
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    pub fn spec(&self) -> Option<AudioSpec> {
        self.spec
    }

    pub fn stats(&self) -> AudioStats {
        self.stats
    }
}

impl std::fmt::Debug for AudioSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSink")
            .field("driver", &self.driver.name())
            .field("open", &self.device.is_some())
            .field("spec", &self.spec)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Converts the core's floating-point sample rate to whole hertz.
pub fn sample_rate_hz(rate: f64) -> Option<u32> {
    if rate.is_finite() && rate >= 1.0 && rate <= f64::from(u32::MAX) {
        Some(rate.round() as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::error::RuntimeError;

    #[derive(Default)]
    struct Script {
        fail_next: bool,
        writes: Vec<usize>,
        recoveries: usize,
    }

    struct ScriptedBackend(Rc<RefCell<Script>>);

    impl AudioBackend for ScriptedBackend {
        fn write(&mut self, samples: &[i16]) -> Result<usize> {
            let mut script = self.0.borrow_mut();
            if std::mem::take(&mut script.fail_next) {
                return Err(RuntimeError::AudioDevice("underrun".into()));
            }
            script.writes.push(samples.len());
            Ok(samples.len() / 2)
        }

        fn recover(&mut self) -> Result<()> {
            self.0.borrow_mut().recoveries += 1;
            Ok(())
        }
    }

    struct ScriptedDriver(Rc<RefCell<Script>>);

    impl AudioDriver for ScriptedDriver {
        fn name(&self) -> &str {
            "scripted"
        }

        fn open(&self, _spec: &AudioSpec) -> Result<Box<dyn AudioBackend>> {
            Ok(Box::new(ScriptedBackend(Rc::clone(&self.0))))
        }
    }

    struct BrokenDriver;

    impl AudioDriver for BrokenDriver {
        fn name(&self) -> &str {
            "broken"
        }

        fn open(&self, _spec: &AudioSpec) -> Result<Box<dyn AudioBackend>> {
            Err(RuntimeError::AudioDevice("no output device".into()))
        }
    }

    #[test]
    fn device_error_reports_zero_and_stays_usable() {
        let script = Rc::new(RefCell::new(Script::default()));
        let mut sink = AudioSink::new(Box::new(ScriptedDriver(Rc::clone(&script))));
        assert!(sink.open(48_000));

        script.borrow_mut().fail_next = true;
        let samples = [0i16; 8];
        assert_eq!(sink.write(&samples, 4), 0);
        assert!(sink.is_open());
        assert_eq!(script.borrow().recoveries, 1);

        assert_eq!(sink.write(&samples, 4), 4);
        assert_eq!(sink.stats().device_errors, 1);
        assert_eq!(sink.stats().frames_written, 4);
    }

    #[test]
    fn open_failure_is_not_fatal() {
        let mut sink = AudioSink::new(Box::new(BrokenDriver));
        assert!(!sink.open(44_100));
        assert!(!sink.is_open());
        // Closed sink swallows frames instead of stalling the core.
        assert_eq!(sink.write(&[1, 2, 3, 4], 2), 2);
        assert_eq!(sink.stats().frames_dropped, 2);
    }

    #[test]
    fn frame_count_is_clamped_to_the_buffer() {
        let script = Rc::new(RefCell::new(Script::default()));
        let mut sink = AudioSink::new(Box::new(ScriptedDriver(Rc::clone(&script))));
        sink.open(32_000);
        assert_eq!(sink.write(&[0; 6], 10), 3);
        assert_eq!(script.borrow().writes, vec![6]);
    }

    #[test]
    fn spec_is_fixed_stereo_with_latency_target() {
        let mut sink = AudioSink::new(Box::new(NullDriver));
        sink.open(32_000);
        let spec = sink.spec().unwrap();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.latency_ms, 64);
        assert_eq!(spec.buffer_samples(), 2048 * 2);

        sink.close();
        sink.close();
        assert!(sink.spec().is_none());
    }

    #[test]
    fn sample_rate_rounds_and_rejects_nonsense() {
        assert_eq!(sample_rate_hz(32_040.5), Some(32_041));
        assert_eq!(sample_rate_hz(0.0), None);
        assert_eq!(sample_rate_hz(f64::NAN), None);
    }
}
