//! The real-time loop: check for quit, step the core, present.
//!
//! Pacing comes from the platform's present call (vsync on a window, none
//! headless); the driver keeps no timer of its own.

use std::path::Path;

use log::{debug, info};

use crate::audio::AudioStats;
use crate::core::{CoreInterface, LoadedCore};
use crate::error::Result;
use crate::frontend::Frontend;
use crate::video::PresentFrame;

/// Window and display services the loop needs.
pub trait Platform {
    /// Drains pending events and reports whether a quit was requested.
    fn poll_quit(&mut self) -> bool;

    /// Clears the display, draws `frame` if there is one, and shows the result.
    fn present(&mut self, frame: Option<PresentFrame<'_>>) -> Result<()>;

    /// Releases window and graphics resources; called once, last.
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    QuitRequested,
    Stopped,
}

/// Summary of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub presents: u64,
    pub audio: AudioStats,
    pub state: LoopState,
}

/// Binds `core`, loads `content` and runs frames until quit or `max_frames`.
///
/// Whatever happens, teardown runs in order: core, video, audio, platform.
pub fn run<C, P>(
    core: C,
    content: &Path,
    frontend: &mut Frontend,
    platform: &mut P,
    max_frames: Option<u64>,
) -> Result<SessionStats>
where
    C: CoreInterface,
    P: Platform,
{
    let mut loaded = LoadedCore::bind(core, frontend);
    let outcome = match loaded.load_content(content, frontend) {
        Ok(_) => frame_loop(&mut loaded, frontend, platform, max_frames),
        Err(err) => Err(err),
    };

    loaded.unload(frontend);
    let audio = frontend.audio.stats();
    frontend.shutdown();
    platform.release();

    let stats = outcome.map(|mut stats| {
        stats.audio = audio;
        stats.state = LoopState::Stopped;
        stats
    })?;
    info!(
        "stopped after {} frames ({} audio frames written, {} dropped, {} device errors)",
        stats.frames,
        stats.audio.frames_written,
        stats.audio.frames_dropped,
        stats.audio.device_errors
    );
    Ok(stats)
}

fn frame_loop<C, P>(
    loaded: &mut LoadedCore<C>,
    frontend: &mut Frontend,
    platform: &mut P,
    max_frames: Option<u64>,
) -> Result<SessionStats>
where
    C: CoreInterface,
    P: Platform,
{
    let mut stats = SessionStats {
        frames: 0,
        presents: 0,
        audio: AudioStats::default(),
        state: LoopState::Running,
    };

    while stats.state == LoopState::Running {
        if platform.poll_quit() {
            debug!("quit requested by platform");
            stats.state = LoopState::QuitRequested;
            break;
        }
        if max_frames.is_some_and(|max| stats.frames >= max) {
            debug!("frame limit of {} reached", stats.frames);
            stats.state = LoopState::QuitRequested;
            break;
        }

        loaded.run_frame(frontend);
        stats.frames += 1;

        platform.present(frontend.video.present())?;
        stats.presents += 1;
    }
    Ok(stats)
}

/// Platform without a window: never asks to quit and discards frames.
#[derive(Debug, Default)]
pub struct HeadlessPlatform {
    presented: u64,
    uploads: u64,
    last_clip: Option<(u32, u32)>,
    released: bool,
}

impl HeadlessPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Presents that carried new pixels.
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    pub fn last_clip(&self) -> Option<(u32, u32)> {
        self.last_clip
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Platform for HeadlessPlatform {
    fn poll_quit(&mut self) -> bool {
        false
    }

    fn present(&mut self, frame: Option<PresentFrame<'_>>) -> Result<()> {
        self.presented += 1;
        if let Some(frame) = frame {
            if frame.dirty {
                self.uploads += 1;
            }
            self.last_clip = Some((frame.clip_width, frame.clip_height));
        }
        Ok(())
    }

    fn release(&mut self) {
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_counts_uploads_separately() {
        let mut platform = HeadlessPlatform::new();
        platform.present(None).unwrap();
        assert_eq!(platform.presented(), 1);
        assert_eq!(platform.uploads(), 0);
        assert!(!platform.poll_quit());
        platform.release();
        assert!(platform.is_released());
    }
}
