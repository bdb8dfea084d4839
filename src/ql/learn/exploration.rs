use std::fmt::{Display, Formatter};

use anyhow::{anyhow, Result};
use rand::Rng;

use crate::ql::frame_stack::StackedFrames;
use crate::ql::ml_model::model::DeepQLearningModel;
use crate::ql::prelude::{ModelActionType, OneHotAction, QlError};

/// Training phase, derived from the number of elapsed steps. Used for reporting only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Filling the replay memory, no training yet
    Observe,
    /// Training while epsilon anneals
    Explore,
    /// Training with epsilon at its final value
    Exploit,
}

impl Display for Phase {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Phase::Observe => f.write_str("observe"),
            Phase::Explore => f.write_str("explore"),
            Phase::Exploit => f.write_str("exploit"),
        }
    }
}

/// Epsilon-greedy policy with linear annealing of epsilon.
///
/// Epsilon stays at `epsilon_initial` for the first `observe_threshold` steps, then decreases
/// linearly over `explore_span` steps down to `epsilon_final`, where it stays.
#[derive(Clone, Debug)]
pub struct ExplorationSchedule {
    epsilon_initial: f64,
    epsilon_final: f64,
    observe_threshold: usize,
    explore_span: usize,
    epsilon: f64,
    elapsed_steps: usize,
}

impl ExplorationSchedule {
    pub fn new(
        epsilon_initial: f64,
        epsilon_final: f64,
        observe_threshold: usize,
        explore_span: usize,
    ) -> Self {
        assert!(epsilon_final <= epsilon_initial);
        Self {
            epsilon_initial,
            epsilon_final,
            observe_threshold,
            explore_span,
            epsilon: epsilon_initial,
            elapsed_steps: 0,
        }
    }

    pub fn epsilon(&self) -> f64 { self.epsilon }

    pub fn elapsed_steps(&self) -> usize { self.elapsed_steps }

    pub fn observe_threshold(&self) -> usize { self.observe_threshold }

    pub fn phase(&self) -> Phase {
        if self.elapsed_steps <= self.observe_threshold {
            Phase::Observe
        } else if self.elapsed_steps <= self.observe_threshold + self.explore_span {
            Phase::Explore
        } else {
            Phase::Exploit
        }
    }

    /// Random action with probability epsilon, otherwise the action with the highest predicted value.
    ///
    /// Ties between equal predicted values resolve to the lowest action index.
    pub fn select_action<M, R>(
        &self,
        state: &StackedFrames,
        action_space: ModelActionType,
        model: &M,
        rng: &mut R,
    ) -> Result<OneHotAction>
    where
        M: DeepQLearningModel + ?Sized,
        R: Rng + ?Sized,
    {
        if self.epsilon > rng.gen_range(0_f64..1_f64) {
            let a = rng.gen_range(0..action_space);
            return OneHotAction::new(a, action_space);
        }

        let q_values = model.predict(state).map_err(QlError::estimator)?;
        if q_values.len() != action_space as usize {
            return Err(QlError::Estimator(anyhow!(
                "predicted {} action values for an action space of {}",
                q_values.len(),
                action_space
            ))
            .into());
        }
        let best = argmax(&q_values).map_err(QlError::estimator)?;
        OneHotAction::new(best as ModelActionType, action_space)
    }

    /// Counts `n` steps. Each step beyond the observe threshold lowers epsilon by
    /// `(epsilon_initial - epsilon_final) / explore_span`, never below `epsilon_final`.
    pub fn advance(
        &mut self,
        n: usize,
    ) {
        self.elapsed_steps += n;
        let annealing_steps = self.elapsed_steps.saturating_sub(self.observe_threshold);
        if annealing_steps == 0 {
            return;
        }
        self.epsilon = if annealing_steps >= self.explore_span {
            self.epsilon_final
        } else {
            let decay = (self.epsilon_initial - self.epsilon_final) * (annealing_steps as f64 / self.explore_span as f64);
            f64::max(self.epsilon_initial - decay, self.epsilon_final)
        };
    }
}

/// Index of the first maximum
pub fn argmax(values: &[f32]) -> Result<usize> {
    if values.is_empty() {
        return Err(anyhow!("no values to choose from"));
    }
    if let Some(v) = values.iter().find(|v| !v.is_finite()) {
        return Err(anyhow!("non-finite action value {} predicted", v));
    }
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    Ok(best)
}
