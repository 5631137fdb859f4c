use crate::audio::{AudioDriver, AudioSink};
use crate::video::VideoSurface;

/// Host state the core reaches through its callbacks.
///
/// Owned by the frame loop and lent to the callback bridge only for the
/// duration of each call into the core.
#[derive(Debug)]
pub struct Frontend {
    pub video: VideoSurface,
    pub audio: AudioSink,
}

impl Frontend {
    pub fn new(scale: u32, audio: Box<dyn AudioDriver>) -> Self {
        Self {
            video: VideoSurface::new(scale),
            audio: AudioSink::new(audio),
        }
    }

    /// Releases the presentation surface, then the audio device.
    pub fn shutdown(&mut self) {
        self.video.teardown();
        self.audio.close();
    }
}
