use anyhow::{bail, Result};
use image::imageops::{self, FilterType};
use image::{Luma, RgbImage};

use crate::ql::frame_stack::GrayFrame;
use crate::ql::prelude::Preprocessor;

/// Resizes an RGB frame to `width` x `height`, converts it to grayscale and binarizes it:
/// pixels brighter than `threshold` become 255, all others 0.
pub struct BinaryThresholdPreprocessor {
    width: u32,
    height: u32,
    threshold: u8,
}

impl BinaryThresholdPreprocessor {
    pub fn new(
        width: u32,
        height: u32,
        threshold: u8,
    ) -> Self {
        assert!(width > 0 && height > 0);
        Self { width, height, threshold }
    }

    pub fn frame_dims(&self) -> (u32, u32) { (self.width, self.height) }
}

impl Preprocessor for BinaryThresholdPreprocessor {
    type Observation = RgbImage;

    fn preprocess(
        &self,
        observation: &RgbImage,
    ) -> Result<GrayFrame> {
        if observation.width() == 0 || observation.height() == 0 {
            bail!("empty observation");
        }
        let resized = imageops::resize(observation, self.width, self.height, FilterType::Nearest);
        let mut frame: GrayFrame = imageops::grayscale(&resized);
        for Luma([v]) in frame.pixels_mut() {
            *v = if *v > self.threshold { 255 } else { 0 };
        }
        Ok(frame)
    }
}
