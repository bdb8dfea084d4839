use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, bail, Result};
use image::Luma;

use crate::ql::frame_stack::{GrayFrame, StackedFrames};
use crate::ql::ml_model::checkpoint::Checkpoint;
use crate::ql::ml_model::model::DeepQLearningModel;
use crate::ql::prelude::{Environment, OneHotAction, Preprocessor};

/// Predicts the same action values for every state and records what it is trained with
pub struct FixedQModel {
    q_values: Vec<f32>,
    pub batch_predict_calls: Cell<usize>,
    pub train_calls: Vec<(Vec<OneHotAction>, Vec<f32>)>,
    pub read_checkpoints: Vec<PathBuf>,
}

impl FixedQModel {
    pub fn new(q_values: Vec<f32>) -> Self {
        Self {
            q_values,
            batch_predict_calls: Cell::new(0),
            train_calls: vec![],
            read_checkpoints: vec![],
        }
    }
}

impl DeepQLearningModel for FixedQModel {
    fn predict(
        &self,
        _state: &StackedFrames,
    ) -> Result<Vec<f32>> {
        Ok(self.q_values.clone())
    }

    fn batch_predict(
        &self,
        states: &[&StackedFrames],
    ) -> Result<Vec<Vec<f32>>> {
        self.batch_predict_calls.set(self.batch_predict_calls.get() + 1);
        Ok(states.iter().map(|_| self.q_values.clone()).collect())
    }

    fn train(
        &mut self,
        _state_batch: &[&StackedFrames],
        action_batch: &[OneHotAction],
        updated_q_values: &[f32],
    ) -> Result<f32> {
        self.train_calls.push((action_batch.to_vec(), updated_q_values.to_vec()));
        Ok(0.5)
    }

    fn write_checkpoint(
        &self,
        file: &Path,
    ) -> Result<()> {
        fs::write(file, b"fixed")?;
        Ok(())
    }

    fn read_checkpoint(
        &mut self,
        file: &Path,
    ) -> Result<()> {
        self.read_checkpoints.push(file.to_path_buf());
        Ok(())
    }
}

/// Emits 1x1 frames with a step counter as intensity and a reward of 1.0 per step
pub struct ScriptedEnvironment {
    terminal_after: Option<usize>,
    failing_after: Option<usize>,
    blank_after: Option<usize>,
    episode_steps: usize,
    total_steps: usize,
    pub resets: usize,
    pub actions: Vec<usize>,
}

impl ScriptedEnvironment {
    fn new(
        terminal_after: Option<usize>,
        failing_after: Option<usize>,
        blank_after: Option<usize>,
    ) -> Self {
        Self {
            terminal_after,
            failing_after,
            blank_after,
            episode_steps: 0,
            total_steps: 0,
            resets: 0,
            actions: vec![],
        }
    }

    pub fn endless() -> Self { Self::new(None, None, None) }

    /// Every episode ends with the `n`-th step
    pub fn terminal_after(n: usize) -> Self { Self::new(Some(n), None, None) }

    /// Fails on the step after the `n`-th one
    pub fn failing_after(n: usize) -> Self { Self::new(None, Some(n), None) }

    /// Emits empty frames from the step after the `n`-th one on
    pub fn blank_after(n: usize) -> Self { Self::new(None, None, Some(n)) }

    fn frame(&self) -> GrayFrame {
        match self.blank_after {
            Some(n) if self.total_steps > n => GrayFrame::new(0, 0),
            _ => GrayFrame::from_pixel(1, 1, Luma([(self.total_steps % 256) as u8])),
        }
    }
}

impl Environment for ScriptedEnvironment {
    type Observation = GrayFrame;

    fn reset(&mut self) -> Result<GrayFrame> {
        self.resets += 1;
        self.episode_steps = 0;
        Ok(self.frame())
    }

    fn step(
        &mut self,
        action: &OneHotAction,
    ) -> Result<(GrayFrame, f32, bool)> {
        if self.failing_after == Some(self.total_steps) {
            bail!("emulator crashed");
        }
        self.actions.push(action.index());
        self.episode_steps += 1;
        self.total_steps += 1;
        let terminal = self.terminal_after == Some(self.episode_steps);
        Ok((self.frame(), 1.0, terminal))
    }
}

pub struct IdentityPreprocessor;

impl Preprocessor for IdentityPreprocessor {
    type Observation = GrayFrame;

    fn preprocess(
        &self,
        observation: &GrayFrame,
    ) -> Result<GrayFrame> {
        if observation.is_empty() {
            return Err(anyhow!("empty observation"));
        }
        Ok(observation.clone())
    }
}

/// Remembers the step counts of saved checkpoints
pub struct RecordingCheckpoint {
    saved: Rc<RefCell<Vec<usize>>>,
}

impl RecordingCheckpoint {
    pub fn new(saved: Rc<RefCell<Vec<usize>>>) -> Self { Self { saved } }
}

impl<M> Checkpoint<M> for RecordingCheckpoint {
    fn save(
        &self,
        _model: &M,
        step_count: usize,
    ) -> Result<()> {
        self.saved.borrow_mut().push(step_count);
        Ok(())
    }

    fn load(
        &self,
        _model: &mut M,
    ) -> Result<Option<usize>> {
        Ok(self.saved.borrow().last().copied())
    }
}
