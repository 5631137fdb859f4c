use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use log::{debug, error, info};
use parking_lot::Mutex;

use super::resample::Resampler;
use super::{AudioBackend, AudioDriver, AudioSpec, CHANNELS};
use crate::error::{Result, RuntimeError};

/// Sleep between attempts to push into a full queue.
const BACKOFF_MICROS: u64 = 250;

impl From<cpal::BuildStreamError> for RuntimeError {
    fn from(err: cpal::BuildStreamError) -> Self {
        RuntimeError::AudioDevice(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for RuntimeError {
    fn from(err: cpal::PlayStreamError) -> Self {
        RuntimeError::AudioDevice(err.to_string())
    }
}

/// Core-rate stereo queue shared between the frame loop and the cpal callback thread.
#[derive(Debug)]
struct SharedQueue {
    samples: Mutex<VecDeque<i16>>,
    capacity: usize,
    failure: Mutex<Option<String>>,
}

impl SharedQueue {
    fn new(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            failure: Mutex::new(None),
        }
    }

    /// Queues as many whole frames as fit and returns the samples taken.
    fn push(&self, samples: &[i16]) -> usize {
        let channels = usize::from(CHANNELS);
        let mut queue = self.samples.lock();
        let free = self.capacity.saturating_sub(queue.len());
        let take = free.min(samples.len()) / channels * channels;
        queue.extend(&samples[..take]);
        take
    }

    /// Fills a device buffer of `channels`-wide frames at the device rate.
    ///
    /// Mono devices get the average of both sides; channels past the second
    /// stay at equilibrium.
    fn render<T>(&self, out: &mut [T], channels: usize, resampler: &mut Resampler)
    where
        T: SizedSample + FromSample<i16>,
    {
        let mut queue = self.samples.lock();
        for frame in out.chunks_mut(channels.max(1)) {
            let [left, right] = resampler.next_frame(&mut queue);
            match frame {
                [mono] => {
                    let mixed = (i32::from(left) + i32::from(right)) / 2;
                    *mono = T::from_sample(mixed as i16);
                }
                [l, r, rest @ ..] => {
                    *l = T::from_sample(left);
                    *r = T::from_sample(right);
                    rest.fill(T::EQUILIBRIUM);
                }
                [] => {}
            }
        }
    }

    fn fail(&self, message: String) {
        *self.failure.lock() = Some(message);
    }

    fn take_failure(&self) -> Option<String> {
        self.failure.lock().take()
    }

    fn clear(&self) {
        self.samples.lock().clear();
    }
}

/// Picks the output format closest to what the core produces.
///
/// Only ranges that contain `rate` qualify. Stereo beats other layouts, then
/// `i16` beats `f32` beats anything else. `None` means the device has to be
/// driven at its default config through the resampler.
fn choose_config(
    ranges: impl IntoIterator<Item = cpal::SupportedStreamConfigRange>,
    rate: u32,
) -> Option<cpal::SupportedStreamConfig> {
    let rank = |range: &cpal::SupportedStreamConfigRange| {
        let layout = u8::from(range.channels() != CHANNELS);
        let format = match range.sample_format() {
            SampleFormat::I16 => 0u8,
            SampleFormat::F32 => 1,
            _ => 2,
        };
        (layout, format)
    };
    ranges
        .into_iter()
        .filter(|range| {
            range.channels() > 0
                && range.min_sample_rate().0 <= rate
                && rate <= range.max_sample_rate().0
        })
        .min_by_key(rank)
        .map(|range| range.with_sample_rate(cpal::SampleRate(rate)))
}

fn negotiate(device: &cpal::Device, rate: u32) -> Result<cpal::SupportedStreamConfig> {
    match device.supported_output_configs() {
        Ok(ranges) => {
            if let Some(config) = choose_config(ranges, rate) {
                return Ok(config);
            }
            debug!("no output config runs at {rate} Hz; resampling to the default");
        }
        Err(err) => debug!("output configs unavailable ({err}); using the default"),
    }
    device
        .default_output_config()
        .map_err(|err| RuntimeError::AudioDevice(err.to_string()))
}

/// Plays through the host's default output device.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDriver;

impl AudioDriver for CpalDriver {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(&self, spec: &AudioSpec) -> Result<Box<dyn AudioBackend>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| RuntimeError::AudioDevice("no default output device".into()))?;
        if let Ok(name) = device.name() {
            debug!("audio output device: {name}");
        }

        let supported = negotiate(&device, spec.sample_rate)?;
        let format = supported.sample_format();
        let config = supported.config();
        let resampler = Resampler::new(spec.sample_rate, config.sample_rate.0);
        info!(
            "audio output: {} Hz {format:?} x{} (core {} Hz{})",
            config.sample_rate.0,
            config.channels,
            spec.sample_rate,
            if resampler.is_passthrough() { "" } else { ", resampled" }
        );

        let queue = Arc::new(SharedQueue::new(spec.buffer_samples()));
        let stream = build_stream(&device, &config, format, &queue, resampler)?;
        stream.play()?;

        Ok(Box::new(CpalBackend {
            device,
            config,
            format,
            core_rate: spec.sample_rate,
            queue,
            stream,
            max_wait: Duration::from_millis(u64::from(spec.latency_ms) * 2),
        }))
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: SampleFormat,
    queue: &Arc<SharedQueue>,
    resampler: Resampler,
) -> Result<cpal::Stream> {
    match format {
        SampleFormat::I8 => build_typed::<i8>(device, config, queue, resampler),
        SampleFormat::I16 => build_typed::<i16>(device, config, queue, resampler),
        SampleFormat::I32 => build_typed::<i32>(device, config, queue, resampler),
        SampleFormat::I64 => build_typed::<i64>(device, config, queue, resampler),
        SampleFormat::U8 => build_typed::<u8>(device, config, queue, resampler),
        SampleFormat::U16 => build_typed::<u16>(device, config, queue, resampler),
        SampleFormat::U32 => build_typed::<u32>(device, config, queue, resampler),
        SampleFormat::U64 => build_typed::<u64>(device, config, queue, resampler),
        SampleFormat::F32 => build_typed::<f32>(device, config, queue, resampler),
        SampleFormat::F64 => build_typed::<f64>(device, config, queue, resampler),
        other => Err(RuntimeError::AudioDevice(format!(
            "unsupported sample format {other:?}"
        ))),
    }
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SharedQueue>,
    mut resampler: Resampler,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<i16>,
{
    let playback = Arc::clone(queue);
    let errors = Arc::clone(queue);
    let channels = usize::from(config.channels);
    let stream = device.build_output_stream(
        config,
        move |out: &mut [T], _: &cpal::OutputCallbackInfo| {
            playback.render(out, channels, &mut resampler)
        },
        move |err| {
            error!("audio stream error: {err}");
            errors.fail(err.to_string());
        },
        None,
    )?;
    Ok(stream)
}

struct CpalBackend {
    device: cpal::Device,
    config: cpal::StreamConfig,
    format: SampleFormat,
    core_rate: u32,
    queue: Arc<SharedQueue>,
    stream: cpal::Stream,
    max_wait: Duration,
}

impl AudioBackend for CpalBackend {
    fn write(&mut self, samples: &[i16]) -> Result<usize> {
        if let Some(message) = self.queue.take_failure() {
            return Err(RuntimeError::AudioDevice(message));
        }

        let channels = usize::from(CHANNELS);
        let deadline = Instant::now() + self.max_wait;
        let mut offset = 0;
        // Block like a PCM write would, but never longer than the deadline.
        while offset < samples.len() {
            offset += self.queue.push(&samples[offset..]);
            if offset >= samples.len() {
                break;
            }
            if Instant::now() >= deadline {
                debug!(
                    "audio queue full; dropping {} frames",
                    (samples.len() - offset) / channels
                );
                break;
            }
            thread::sleep(Duration::from_micros(BACKOFF_MICROS));
        }
        Ok(offset / channels)
    }

    fn recover(&mut self) -> Result<()> {
        self.queue.clear();
        let resampler = Resampler::new(self.core_rate, self.config.sample_rate.0);
        self.stream = build_stream(&self.device, &self.config, self.format, &self.queue, resampler)?;
        self.stream.play()?;
        debug!("audio stream rebuilt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleRate, SupportedBufferSize, SupportedStreamConfigRange};

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn queue_accepts_whole_frames_only() {
        let queue = SharedQueue::new(5);
        assert_eq!(queue.push(&[1, 2, 3, 4, 5, 6]), 4);
        assert_eq!(queue.push(&[7, 8]), 0);

        let mut out = [9i16; 6];
        queue.render(&mut out, 2, &mut Resampler::new(32_000, 32_000));
        assert_eq!(out, [1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn float_devices_receive_converted_samples() {
        let queue = SharedQueue::new(8);
        queue.push(&[i16::MAX, i16::MIN, 0, 0]);

        let mut out = [1.0f32; 4];
        queue.render(&mut out, 2, &mut Resampler::new(48_000, 48_000));
        assert!(out[0] > 0.99);
        assert_eq!(out[1], -1.0);
        assert_eq!(&out[2..], &[0.0, 0.0]);
    }

    #[test]
    fn mono_and_surround_layouts_are_filled() {
        let queue = SharedQueue::new(8);
        queue.push(&[100, 300, -40, -40]);

        let mut mono = [0i16; 2];
        queue.render(&mut mono, 1, &mut Resampler::new(44_100, 44_100));
        assert_eq!(mono, [200, -40]);

        queue.push(&[7, 8]);
        let mut quad = [9u16; 4];
        queue.render(&mut quad, 4, &mut Resampler::new(44_100, 44_100));
        assert_eq!(quad[0], u16::from_sample(7i16));
        assert_eq!(quad[1], u16::from_sample(8i16));
        assert_eq!(&quad[2..], &[u16::EQUILIBRIUM, u16::EQUILIBRIUM]);
    }

    #[test]
    fn config_prefers_stereo_i16_at_the_core_rate() {
        let ranges = [
            range(2, 44_100, 48_000, SampleFormat::F32),
            range(6, 8_000, 192_000, SampleFormat::I16),
            range(2, 8_000, 96_000, SampleFormat::I16),
        ];
        let chosen = choose_config(ranges, 32_000).expect("a range covers 32 kHz");
        assert_eq!(chosen.channels(), 2);
        assert_eq!(chosen.sample_format(), SampleFormat::I16);
        assert_eq!(chosen.sample_rate(), SampleRate(32_000));
    }

    #[test]
    fn config_falls_back_to_float_then_other_layouts() {
        let float = [
            range(2, 8_000, 96_000, SampleFormat::F32),
            range(1, 8_000, 96_000, SampleFormat::I16),
        ];
        let chosen = choose_config(float, 44_100).expect("float stereo qualifies");
        assert_eq!(chosen.sample_format(), SampleFormat::F32);

        let mono = [range(1, 8_000, 96_000, SampleFormat::I16)];
        assert_eq!(choose_config(mono, 44_100).map(|c| c.channels()), Some(1));
    }

    #[test]
    fn no_range_at_the_core_rate_means_resampling() {
        let ranges = [range(2, 44_100, 48_000, SampleFormat::F32)];
        assert!(choose_config(ranges, 32_768).is_none());
    }

    #[test]
    fn failure_is_reported_once() {
        let queue = SharedQueue::new(4);
        queue.fail("device unplugged".into());
        assert_eq!(queue.take_failure().as_deref(), Some("device unplugged"));
        assert_eq!(queue.take_failure(), None);
    }
}
