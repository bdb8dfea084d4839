use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::{ensure, Result};
use image::{ImageBuffer, Luma};

// Gray-scaled image
pub type GrayFrame = ImageBuffer<Luma<u8>, Vec<u8>>;

/// World state: the `K` most recent frames, oldest first.
///
/// A value object - advancing produces a fresh instance, so a stack referenced by a stored
/// transition never changes. Frames are shared between consecutive stacks.
#[derive(Clone, Debug, PartialEq)]
pub struct StackedFrames {
    frames: VecDeque<Rc<GrayFrame>>,
}

impl StackedFrames {
    pub fn len(&self) -> usize { self.frames.len() }

    pub fn is_empty(&self) -> bool { self.frames.is_empty() }

    /// `steps_into_history` = 0 is the newest frame
    pub fn get(
        &self,
        steps_into_history: usize,
    ) -> &GrayFrame {
        assert!(steps_into_history < self.len(), "available steps into history: 0..{}", self.len());
        &self.frames[self.len() - 1 - steps_into_history]
    }

    pub fn newest(&self) -> &GrayFrame { self.get(0) }

    /// Frames from oldest to newest
    pub fn frames(&self) -> impl Iterator<Item = &GrayFrame> { self.frames.iter().map(|f| &**f) }

    pub fn frame_dims(&self) -> (u32, u32) { self.newest().dimensions() }

    /// Number of values produced by [Self::to_input_vector]
    pub fn input_len(&self) -> usize {
        let (x, y) = self.frame_dims();
        self.len() * x as usize * y as usize
    }

    /// Flattened pixel intensities, normalized to `[0, 1]`, in `[frame][y][x]` order (oldest frame first)
    pub fn to_input_vector(&self) -> Vec<f32> {
        let mut result = Vec::with_capacity(self.input_len());
        for frame in self.frames() {
            result.extend(frame.as_raw().iter().map(|&p| p as f32 / u8::MAX as f32));
        }
        result
    }

    fn advance(
        &self,
        new_frame: GrayFrame,
    ) -> Result<StackedFrames> {
        ensure!(
            new_frame.dimensions() == self.frame_dims(),
            "frame dimension mismatch. Expected {:?}, got {:?}",
            self.frame_dims(),
            new_frame.dimensions()
        );
        let mut frames = self.frames.clone();
        frames.pop_front();
        frames.push_back(Rc::new(new_frame));
        Ok(StackedFrames { frames })
    }
}

/// Produces [StackedFrames] of a fixed depth
#[derive(Clone, Copy, Debug)]
pub struct FrameStack {
    depth: usize,
}

impl FrameStack {
    pub fn new(depth: usize) -> Self {
        assert!(depth > 0);
        Self { depth }
    }

    pub fn depth(&self) -> usize { self.depth }

    /// Initial state: `first_frame` replicated `depth` times
    pub fn initialize(
        &self,
        first_frame: GrayFrame,
    ) -> StackedFrames {
        let frame = Rc::new(first_frame);
        StackedFrames {
            frames: (0..self.depth).map(|_| Rc::clone(&frame)).collect(),
        }
    }

    /// Returns a new stack without the oldest frame of `stack` and with `new_frame` as the newest one.
    /// Fails if `new_frame` differs in size from the frames already stacked.
    pub fn advance(
        &self,
        stack: &StackedFrames,
        new_frame: GrayFrame,
    ) -> Result<StackedFrames> {
        debug_assert_eq!(stack.len(), self.depth);
        stack.advance(new_frame)
    }
}
