use anyhow::{anyhow, Result};
use rand::Rng;

use crate::ql::frame_stack::StackedFrames;
use crate::ql::learn::replay_buffer::ReplayMemory;
use crate::ql::ml_model::model::DeepQLearningModel;
use crate::ql::prelude::{OneHotAction, QlError};

/// One minibatch update of the model from replayed experience.
///
/// Samples `batch_size` distinct transitions, builds the Bellman targets with the *current* model
/// and performs one training step. Returns the training loss.
///
/// Fails with [QlError::InsufficientData] when the memory holds less than `batch_size` transitions
/// and with [QlError::Estimator] when the model fails, produces non-finite values for a non-terminal
/// next state or a non-finite loss.
pub fn run<M, R>(
    replay_memory: &ReplayMemory,
    model: &mut M,
    batch_size: usize,
    gamma: f32,
    rng: &mut R,
) -> Result<f32>
where
    M: DeepQLearningModel + ?Sized,
    R: Rng + ?Sized,
{
    let samples = replay_memory.sample(batch_size, rng)?;

    let state_samples: Vec<&StackedFrames> = samples.iter().map(|t| t.state()).collect();
    let state_next_samples: Vec<&StackedFrames> = samples.iter().map(|t| t.next_state()).collect();
    let action_samples: Vec<OneHotAction> = samples.iter().map(|t| t.action()).collect();
    let reward_samples: Vec<f32> = samples.iter().map(|t| t.reward()).collect();
    let terminal_samples: Vec<bool> = samples.iter().map(|t| t.terminal()).collect();

    // Build the updated Q-values for the sampled future states - all in one pass
    let future_rewards = model.batch_predict(&state_next_samples).map_err(QlError::estimator)?;
    if future_rewards.len() != batch_size {
        return Err(QlError::Estimator(anyhow!(
            "predicted {} value vectors for a batch of {}",
            future_rewards.len(),
            batch_size
        ))
        .into());
    }
    // the future value of a terminal step is never used
    let max_future_rewards = future_rewards
        .iter()
        .zip(&terminal_samples)
        .map(|(q, &terminal)| match terminal {
            true => Ok(0.0),
            false => max_value(q),
        })
        .collect::<Result<Vec<f32>>>()
        .map_err(QlError::estimator)?;

    let updated_q_values = td_targets(&reward_samples, &terminal_samples, &max_future_rewards, gamma);

    let loss = model
        .train(&state_samples, &action_samples, &updated_q_values)
        .map_err(QlError::estimator)?;
    if !loss.is_finite() {
        return Err(QlError::Estimator(anyhow!("training diverged, loss: {}", loss)).into());
    }
    Ok(loss)
}

/// Q value = reward + discount factor * expected future reward.
/// For terminal steps, the updated q-value is exactly the reward.
pub fn td_targets(
    rewards: &[f32],
    terminals: &[bool],
    max_future_rewards: &[f32],
    gamma: f32,
) -> Vec<f32> {
    debug_assert!(rewards.len() == terminals.len() && rewards.len() == max_future_rewards.len());
    rewards
        .iter()
        .zip(terminals)
        .zip(max_future_rewards)
        .map(|((&reward, &terminal), &max_future_reward)| match terminal {
            true => reward,
            false => reward + gamma * max_future_reward,
        })
        .collect()
}

fn max_value(q_values: &[f32]) -> Result<f32> {
    if q_values.is_empty() || q_values.iter().any(|v| !v.is_finite()) {
        return Err(anyhow!("invalid action values predicted: {:?}", q_values));
    }
    Ok(q_values.iter().copied().fold(f32::NEG_INFINITY, f32::max))
}
