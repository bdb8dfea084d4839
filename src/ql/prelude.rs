use std::fmt::{Display, Formatter};

use anyhow::Result;

use crate::ql::frame_stack::GrayFrame;

/// Data type we use to encode an action index.
/// This one should fit for all usage scenarios (for now).
pub type ModelActionType = u8;

/// An action, ONE-HOT encoded over the action space.
///
/// Only the index of the hot entry is stored; [Self::to_vec] produces the full vector.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct OneHotAction {
    index: ModelActionType,
    action_space: ModelActionType,
}

impl OneHotAction {
    pub fn new(
        index: ModelActionType,
        action_space: ModelActionType,
    ) -> Result<Self> {
        if index >= action_space {
            return Err(QlError::InvalidAction { index, action_space }.into());
        }
        Ok(Self { index, action_space })
    }

    pub fn index(&self) -> usize { self.index as usize }

    pub fn action_space(&self) -> usize { self.action_space as usize }

    pub fn to_vec(&self) -> Vec<f32> {
        let mut v = vec![0.0; self.action_space()];
        v[self.index()] = 1.0;
        v
    }
}

impl Display for OneHotAction {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "a{}", self.index)
    }
}

/// Learning environment, modeling the world of a learning agent
pub trait Environment {
    /// Raw observation as produced by the environment, e.g. an RGB frame
    type Observation;

    /// Resets the environment to a defined starting point and returns the first observation
    fn reset(&mut self) -> Result<Self::Observation>;

    /// Performs one time/action-step.
    ///
    /// Applies the given `action` to the environment and returns:
    ///   - next observation
    ///   - immediate reward earned during performing that step
    ///   - terminal flag (e.g. game ended)
    ///
    fn step(
        &mut self,
        action: &OneHotAction,
    ) -> Result<(Self::Observation, f32, bool)>;
}

/// Turns a raw observation into a normalized single-channel frame of fixed dimensions
pub trait Preprocessor {
    type Observation;

    fn preprocess(
        &self,
        observation: &Self::Observation,
    ) -> Result<GrayFrame>;
}

#[derive(Debug)]
pub enum QlError {
    /// More items requested from a replay buffer than it currently holds
    InsufficientData { requested: usize, available: usize },
    /// Failure surfaced by the environment (reset, step or preprocessing of its observation)
    Environment(anyhow::Error),
    /// Backend failure or numerical instability of the value estimator
    Estimator(anyhow::Error),
    InvalidParameter(String),
    InvalidAction { index: ModelActionType, action_space: ModelActionType },
}

impl QlError {
    pub fn environment(e: anyhow::Error) -> Self { QlError::Environment(e) }

    pub fn estimator(e: anyhow::Error) -> Self { QlError::Estimator(e) }
}

impl Display for QlError {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            QlError::InsufficientData { requested, available } => {
                write!(f, "insufficient data: requested {} items, only {} available", requested, available)
            }
            QlError::Environment(_) => f.write_str("environment failure"),
            QlError::Estimator(_) => f.write_str("value estimator failure"),
            QlError::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
            QlError::InvalidAction { index, action_space } => {
                write!(f, "action index {} out of range (0..{})", index, action_space)
            }
        }
    }
}

impl std::error::Error for QlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QlError::Environment(e) | QlError::Estimator(e) => {
                let source: &(dyn std::error::Error + 'static) = e.as_ref();
                Some(source)
            }
            _ => None,
        }
    }
}
