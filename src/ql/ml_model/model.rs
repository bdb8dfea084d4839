use std::path::Path;

use anyhow::Result;

use crate::ql::frame_stack::StackedFrames;
use crate::ql::prelude::OneHotAction;

pub const DEFAULT_BATCH_SIZE: usize = 32;

/// 'Physical' AI model abstraction: an opaque, differentiable action-value function.
///
/// The learner uses the same model for action selection and for the bootstrap targets.
/// There is no separate, periodically synchronized target model.
pub trait DeepQLearningModel {
    /// Predicts one value per action for the given state.
    ///
    /// # Arguments
    /// * `state` the `K` most recent frames, representing the current world state
    ///
    fn predict(
        &self,
        state: &StackedFrames,
    ) -> Result<Vec<f32>>;

    /// Predicts action values for a batch of states in one pass.
    /// Returns one vector of action values per state, in input order.
    fn batch_predict(
        &self,
        states: &[&StackedFrames],
    ) -> Result<Vec<Vec<f32>>>;

    /// Performs a single training step using a batch of data.
    /// Minimizes the squared error between the predicted value of the taken action and its target.
    ///
    /// # Arguments
    /// * `state_batch` states, the actions were taken in
    /// * `action_batch` actions taken
    /// * `updated_q_values` target values (same length as the other batches)
    ///
    /// # Returns
    ///   calculated loss
    ///
    fn train(
        &mut self,
        state_batch: &[&StackedFrames],
        action_batch: &[OneHotAction],
        updated_q_values: &[f32],
    ) -> Result<f32>;

    fn write_checkpoint(
        &self,
        file: &Path,
    ) -> Result<()>;

    fn read_checkpoint(
        &mut self,
        file: &Path,
    ) -> Result<()>;
}
