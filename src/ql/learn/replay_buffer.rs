use std::collections::VecDeque;
use std::rc::Rc;

use rand::Rng;

use crate::ql::frame_stack::StackedFrames;
use crate::ql::prelude::{OneHotAction, QlError};

/// One step of interaction with the environment
#[derive(Clone, Debug)]
pub struct Transition {
    state: Rc<StackedFrames>,
    action: OneHotAction,
    reward: f32,
    next_state: Rc<StackedFrames>,
    terminal: bool,
}

impl Transition {
    pub fn new(
        state: Rc<StackedFrames>,
        action: OneHotAction,
        reward: f32,
        next_state: Rc<StackedFrames>,
        terminal: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            terminal,
        }
    }

    pub fn state(&self) -> &StackedFrames { &self.state }

    pub fn action(&self) -> OneHotAction { self.action }

    pub fn reward(&self) -> f32 { self.reward }

    pub fn next_state(&self) -> &StackedFrames { &self.next_state }

    pub fn terminal(&self) -> bool { self.terminal }
}

/// Bounded FIFO buffer. When full, adding an element evicts the oldest one.
pub struct ReplayBuffer<T> {
    max_buffer_len: usize,
    buffer: VecDeque<T>,
}

/// Experience replay memory
pub type ReplayMemory = ReplayBuffer<Transition>;

impl<T> ReplayBuffer<T> {
    pub fn new(max_buffer_len: usize) -> Self {
        assert!(max_buffer_len > 0);
        Self {
            max_buffer_len,
            buffer: VecDeque::with_capacity(max_buffer_len),
        }
    }

    pub fn len(&self) -> usize { self.buffer.len() }

    pub fn is_empty(&self) -> bool { self.buffer.is_empty() }

    pub fn capacity(&self) -> usize { self.max_buffer_len }

    pub fn append(
        &mut self,
        element: T,
    ) {
        self.buffer.push_back(element);
        if self.buffer.len() > self.max_buffer_len {
            self.buffer.pop_front();
        }
    }

    /// Elements from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> { self.buffer.iter() }

    /// Returns `n` elements drawn uniformly at random at distinct positions.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<&T>, QlError> {
        if n > self.buffer.len() {
            return Err(QlError::InsufficientData {
                requested: n,
                available: self.buffer.len(),
            });
        }
        Ok(rand::seq::index::sample(rng, self.buffer.len(), n)
            .into_iter()
            .map(|i| &self.buffer[i])
            .collect())
    }
}

impl ReplayBuffer<f32> {
    pub fn avg(&self) -> f32 {
        if self.buffer.is_empty() {
            return 0.0;
        }
        self.buffer.iter().sum::<f32>() / self.buffer.len() as f32
    }
}
