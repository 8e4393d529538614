//! # Framing Module
//!
//! Cuts a mono sample stream into fixed-size, optionally overlapping frames.
//! Frame `i` starts at sample `i * (frame_size - overlap)`, so the start of
//! every frame divided by the sample rate is its timestamp.
//!
//! The source is consumed lazily and buffered the same way a live input
//! callback would: samples are appended until a full frame is available,
//! the frame is handed out and the consumed hop is drained from the front.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToneScaleError};

/// What to do with the trailing samples that do not fill a whole frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TailPolicy {
    /// Emit a final frame padded with zeros.
    #[default]
    ZeroPad,
    /// Drop the trailing samples.
    Skip,
}

/// A block of `frame_size` samples read from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Sample data, always exactly the configured frame size.
    pub samples: Vec<f32>,
    /// Index of the first sample of this frame in the source.
    pub start_sample: usize,
    /// Number of leading samples shared with the previous frame.
    pub overlap: usize,
    /// Number of samples taken from the source; the rest is zero padding.
    pub valid_len: usize,
}

impl Frame {
    /// Time of the first sample in seconds.
    pub fn timestamp(&self, sample_rate: f32) -> f64 {
        self.start_sample as f64 / sample_rate as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True when the frame had to be zero padded.
    pub fn is_padded(&self) -> bool {
        self.valid_len < self.samples.len()
    }
}

/// Lazy iterator of frames over any sample iterator.
#[derive(Debug)]
pub struct FrameSource<I> {
    samples: I,
    frame_size: usize,
    overlap: usize,
    tail: TailPolicy,
    buffer: Vec<f32>,
    // Buffered samples that no emitted frame has covered yet.
    fresh: usize,
    next_start: usize,
    emitted: usize,
    exhausted: bool,
}

impl<I> FrameSource<I>
where
    I: Iterator<Item = f32>,
{
    /// Creates a frame source.
    ///
    /// # Errors
    /// `InvalidArgument` if `frame_size` is zero or `overlap >= frame_size`.
    pub fn new<S>(samples: S, frame_size: usize, overlap: usize, tail: TailPolicy) -> Result<Self>
    where
        S: IntoIterator<IntoIter = I>,
    {
        if frame_size == 0 {
            return Err(ToneScaleError::invalid("frame size must be positive"));
        }
        if overlap >= frame_size {
            return Err(ToneScaleError::invalid(format!(
                "overlap {overlap} must be smaller than the frame size {frame_size}"
            )));
        }

        Ok(Self {
            samples: samples.into_iter(),
            frame_size,
            overlap,
            tail,
            buffer: Vec::with_capacity(frame_size),
            fresh: 0,
            next_start: 0,
            emitted: 0,
            exhausted: false,
        })
    }

    /// Distance in samples between the starts of consecutive frames.
    pub fn step(&self) -> usize {
        self.frame_size - self.overlap
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn fill(&mut self) {
        while self.buffer.len() < self.frame_size {
            match self.samples.next() {
                Some(sample) => {
                    self.buffer.push(sample);
                    self.fresh += 1;
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
    }

    fn take_frame(&mut self, samples: Vec<f32>, valid_len: usize) -> Frame {
        let frame = Frame {
            samples,
            start_sample: self.next_start,
            overlap: if self.emitted == 0 { 0 } else { self.overlap },
            valid_len,
        };
        self.emitted += 1;
        self.next_start += self.step();
        frame
    }
}

impl<I> Iterator for FrameSource<I>
where
    I: Iterator<Item = f32>,
{
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if !self.exhausted {
            self.fill();
        }

        if self.buffer.len() == self.frame_size {
            let samples = self.buffer.clone();
            let step = self.step();
            self.buffer.drain(..step);
            // Everything left in the buffer was part of this frame.
            self.fresh = 0;
            return Some(self.take_frame(samples, self.frame_size));
        }

        // Source exhausted with a partial frame left.
        if self.fresh == 0 || self.buffer.is_empty() {
            return None;
        }
        self.fresh = 0;
        match self.tail {
            TailPolicy::Skip => {
                self.buffer.clear();
                None
            }
            TailPolicy::ZeroPad => {
                let valid_len = self.buffer.len();
                let mut samples = std::mem::take(&mut self.buffer);
                samples.resize(self.frame_size, 0.0);
                Some(self.take_frame(samples, valid_len))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32).collect()
    }

    #[test]
    fn empty_input_yields_no_frames() {
        let frames: Vec<Frame> = FrameSource::new(Vec::new(), 8, 4, TailPolicy::ZeroPad)
            .unwrap()
            .collect();
        assert!(frames.is_empty());
    }

    #[test]
    fn frames_start_at_multiples_of_the_hop() {
        let source = FrameSource::new(ramp(16), 8, 4, TailPolicy::Skip).unwrap();
        let frames: Vec<Frame> = source.collect();

        let starts: Vec<usize> = frames.iter().map(|f| f.start_sample).collect();
        assert_eq!(starts, vec![0, 4, 8]);
        for frame in &frames {
            assert_eq!(frame.samples[0], frame.start_sample as f32);
            assert_eq!(frame.len(), 8);
        }
        assert_eq!(frames[0].overlap, 0);
        assert_eq!(frames[1].overlap, 4);
    }

    #[test]
    fn trailing_samples_are_zero_padded() {
        let frames: Vec<Frame> = FrameSource::new(ramp(10), 4, 0, TailPolicy::ZeroPad)
            .unwrap()
            .collect();
        assert_eq!(frames.len(), 3);
        let last = &frames[2];
        assert_eq!(last.start_sample, 8);
        assert_eq!(last.valid_len, 2);
        assert_eq!(last.samples, vec![8.0, 9.0, 0.0, 0.0]);
        assert!(last.is_padded());
    }

    #[test]
    fn trailing_samples_can_be_skipped() {
        let frames: Vec<Frame> = FrameSource::new(ramp(10), 4, 0, TailPolicy::Skip)
            .unwrap()
            .collect();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn overlap_already_covered_does_not_produce_a_tail() {
        // 12 samples, frames of 8 with hop 4: [0..8), [4..12). The remaining
        // 4 samples were covered by the second frame.
        let frames: Vec<Frame> = FrameSource::new(ramp(12), 8, 4, TailPolicy::ZeroPad)
            .unwrap()
            .collect();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn short_input_is_padded_into_one_frame() {
        let frames: Vec<Frame> = FrameSource::new(ramp(3), 8, 2, TailPolicy::ZeroPad)
            .unwrap()
            .collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].start_sample, 0);
        assert_eq!(frames[0].valid_len, 3);
    }

    #[test]
    fn rejects_invalid_geometry() {
        assert!(FrameSource::new(ramp(4), 0, 0, TailPolicy::Skip).is_err());
        assert!(FrameSource::new(ramp(4), 4, 4, TailPolicy::Skip).is_err());
    }

    #[test]
    fn timestamp_is_start_over_sample_rate() {
        let frames: Vec<Frame> = FrameSource::new(ramp(20), 8, 4, TailPolicy::Skip)
            .unwrap()
            .collect();
        assert!((frames[2].timestamp(4.0) - 2.0).abs() < 1e-12);
    }
}
