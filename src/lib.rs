//! Deep Q-Learning with experience replay, learning to play pixel games from raw frames.
//!
//! The training core lives in [ql]: replay memory, epsilon-greedy exploration schedule,
//! stacked-frame states, the minibatch Bellman training step and the self-driving learner,
//! which orchestrates them. [environment] provides a small pixel game and the frame preprocessing.

pub mod environment;
pub mod ql;
pub mod util;
