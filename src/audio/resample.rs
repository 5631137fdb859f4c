//! Linear-interpolating rate converter for interleaved stereo `i16`.

use std::collections::VecDeque;

/// Steps through core-rate frames at the device rate.
///
/// `pos` is the fractional distance from `prev` towards `next`; each output
/// frame advances it by `in_rate / out_rate`.
#[derive(Debug, Clone)]
pub(super) struct Resampler {
    step: f64,
    pos: f64,
    prev: [i16; 2],
    next: [i16; 2],
}

impl Resampler {
    pub(super) fn new(in_rate: u32, out_rate: u32) -> Self {
        Self {
            step: f64::from(in_rate) / f64::from(out_rate.max(1)),
            // Two whole steps pending so the first output is the first queued frame.
            pos: 2.0,
            prev: [0; 2],
            next: [0; 2],
        }
    }

    pub(super) fn is_passthrough(&self) -> bool {
        self.step == 1.0
    }

    /// Produces one output frame, consuming queued input as needed.
    ///
    /// An empty queue reads as silence.
    pub(super) fn next_frame(&mut self, queue: &mut VecDeque<i16>) -> [i16; 2] {
        while self.pos >= 1.0 {
            self.prev = self.next;
            self.next = pop_frame(queue).unwrap_or([0; 2]);
            self.pos -= 1.0;
        }
        let t = self.pos;
        let out = [
            lerp(self.prev[0], self.next[0], t),
            lerp(self.prev[1], self.next[1], t),
        ];
        self.pos += self.step;
        out
    }
}

fn pop_frame(queue: &mut VecDeque<i16>) -> Option<[i16; 2]> {
    if queue.len() < 2 {
        return None;
    }
    let left = queue.pop_front()?;
    let right = queue.pop_front()?;
    Some([left, right])
}

fn lerp(a: i16, b: i16, t: f64) -> i16 {
    let value = f64::from(a) + (f64::from(b) - f64::from(a)) * t;
    value.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(frames: &[[i16; 2]]) -> VecDeque<i16> {
        frames.iter().flatten().copied().collect()
    }

    #[test]
    fn equal_rates_pass_frames_through() {
        let mut resampler = Resampler::new(44_100, 44_100);
        assert!(resampler.is_passthrough());
        let mut input = queue(&[[1, -1], [2, -2], [3, -3]]);

        let out: Vec<_> = (0..3).map(|_| resampler.next_frame(&mut input)).collect();
        assert_eq!(out, [[1, -1], [2, -2], [3, -3]]);
        assert!(input.is_empty());
    }

    #[test]
    fn doubling_the_rate_inserts_midpoints() {
        let mut resampler = Resampler::new(24_000, 48_000);
        let mut input = queue(&[[0, 0], [100, -100], [200, -200]]);

        let out: Vec<_> = (0..4).map(|_| resampler.next_frame(&mut input)).collect();
        assert_eq!(out, [[0, 0], [50, -50], [100, -100], [150, -150]]);
    }

    #[test]
    fn halving_the_rate_skips_frames() {
        let mut resampler = Resampler::new(64_000, 32_000);
        let mut input = queue(&[[0, 0], [10, 10], [20, 20], [30, 30], [40, 40]]);

        assert_eq!(resampler.next_frame(&mut input), [0, 0]);
        assert_eq!(resampler.next_frame(&mut input), [20, 20]);
        assert_eq!(resampler.next_frame(&mut input), [40, 40]);
    }

    #[test]
    fn underrun_plays_silence() {
        let mut resampler = Resampler::new(32_000, 48_000);
        let mut input = VecDeque::new();
        assert_eq!(resampler.next_frame(&mut input), [0, 0]);
        assert_eq!(resampler.next_frame(&mut input), [0, 0]);
    }
}
