use std::rc::Rc;

use anyhow::Result;
use itertools::Itertools;
use num_format::ToFormattedString;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;

use crate::ql::frame_stack::{FrameStack, StackedFrames};
use crate::ql::learn::exploration::{ExplorationSchedule, Phase};
use crate::ql::learn::replay_buffer::{ReplayBuffer, ReplayMemory, Transition};
use crate::ql::learn::training_step;
use crate::ql::ml_model::checkpoint::Checkpoint;
use crate::ql::ml_model::model::{DeepQLearningModel, DEFAULT_BATCH_SIZE};
use crate::ql::prelude::{Environment, ModelActionType, Preprocessor, QlError};
use crate::util::format;
use crate::util::immutable::Immutable;

#[derive(Clone, Debug)]
pub struct Parameter {
    /// Discount rate; (0 <= 𝛾 <= 1) represents the value of future rewards. The bigger, the more farsighted the agent becomes
    pub gamma: f32,
    /// Starting value of epsilon
    pub epsilon_initial: f64,
    /// Final value of epsilon
    pub epsilon_final: f64,
    /// Number of steps to observe (fill the replay memory) before training starts
    pub observe_threshold: usize,
    /// Number of steps over which epsilon anneals from `epsilon_initial` to `epsilon_final`
    pub explore_span: usize,
    /// Number of previous transitions to remember
    pub replay_memory_capacity: usize,
    /// Size of a training minibatch
    pub batch_size: usize,
    /// Number of recent frames forming one state
    pub frame_stack_depth: usize,
    pub action_space: ModelActionType,
    pub max_steps_per_episode: usize,
    /// Number of recent episodes the running reward is averaged over
    pub episode_reward_history_buffer_len: usize,
    pub stats_after_steps: usize,
    /// Seed for action selection and minibatch sampling; random if `None`
    pub random_seed: Option<u64>,
}

impl Default for Parameter {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            epsilon_initial: 0.01,
            epsilon_final: 0.0,
            observe_threshold: 100,
            explore_span: 150_000,
            replay_memory_capacity: 50_000,
            batch_size: DEFAULT_BATCH_SIZE,
            frame_stack_depth: 4,
            action_space: 2,
            max_steps_per_episode: 1_000,
            episode_reward_history_buffer_len: 100,
            stats_after_steps: 10_000,
            random_seed: None,
        }
    }
}

impl Parameter {
    pub fn validate(&self) -> Result<(), QlError> {
        let fail = |msg: String| Err(QlError::InvalidParameter(msg));

        if !(0.0..=1.0).contains(&self.gamma) {
            return fail(format!("gamma {} not in [0, 1]", self.gamma));
        }
        if !(0.0 <= self.epsilon_final && self.epsilon_final <= self.epsilon_initial && self.epsilon_initial <= 1.0) {
            return fail(format!(
                "epsilon range [{}, {}] should satisfy 0 <= final <= initial <= 1",
                self.epsilon_final, self.epsilon_initial
            ));
        }
        if self.replay_memory_capacity == 0 {
            return fail("replay memory capacity should be > 0".to_string());
        }
        if self.batch_size == 0 || self.batch_size > self.replay_memory_capacity {
            return fail(format!(
                "batch size {} should be in 1..={} (replay memory capacity)",
                self.batch_size, self.replay_memory_capacity
            ));
        }
        // training starts after `observe_threshold + 1` steps, when the memory holds that many transitions
        if self.batch_size > self.observe_threshold + 1 {
            return fail(format!(
                "batch size {} exceeds the number of transitions available when training starts ({})",
                self.batch_size,
                self.observe_threshold + 1
            ));
        }
        if self.frame_stack_depth == 0 {
            return fail("frame stack depth should be > 0".to_string());
        }
        if self.action_space == 0 {
            return fail("action space should be > 0".to_string());
        }
        if self.max_steps_per_episode == 0 {
            return fail("max steps per episode should be > 0".to_string());
        }
        if self.episode_reward_history_buffer_len == 0 {
            return fail("episode reward history buffer len should be > 0".to_string());
        }
        Ok(())
    }
}

/// Snapshot of the learning progress
#[derive(Clone, Debug, PartialEq)]
pub struct LearningProgress {
    pub episode_count: usize,
    pub episode_step: usize,
    pub elapsed_steps: usize,
    pub phase: Phase,
    pub epsilon: f64,
    pub running_reward: f32,
    pub last_loss: Option<f32>,
}

/// Result of a single step
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepOutcome {
    pub reward: f32,
    pub terminal: bool,
    pub episode_finished: bool,
    pub trained: bool,
}

/// A self-driving Q learning algorithm with experience replay.
///
/// It's directly connected to a (game) environment and drives the speed of the steps in that environment.
/// Each step selects an action (epsilon-greedy), applies it, remembers the transition and - once the
/// observation phase is over - trains the model on a random minibatch of remembered transitions.
///
/// The same model is used for the bootstrap targets as for action selection. This is a known source
/// of training instability; a periodically synchronized target model would be the place to extend.
pub struct SelfDrivingQLearner<E, P, M>
where
    E: Environment,
    P: Preprocessor<Observation = E::Observation>,
    M: DeepQLearningModel,
{
    environment: E,
    preprocessor: P,
    model: M,
    checkpoint: Box<dyn Checkpoint<M>>,
    param: Immutable<Parameter>,
    rng: StdRng,
    frame_stack: FrameStack,
    schedule: ExplorationSchedule,
    replay_memory: ReplayMemory,
    episode_reward_history: ReplayBuffer<f32>,
    /// current state; `None` between episodes
    state: Option<Rc<StackedFrames>>,
    episode_count: usize,
    episode_step: usize,
    episode_reward: f32,
    running_reward: f32,
    last_loss: Option<f32>,
}

impl<E, P, M> SelfDrivingQLearner<E, P, M>
where
    E: Environment,
    P: Preprocessor<Observation = E::Observation>,
    M: DeepQLearningModel,
{
    pub fn new(
        environment: E,
        preprocessor: P,
        model: M,
        checkpoint: Box<dyn Checkpoint<M>>,
        param: Parameter,
    ) -> Result<Self> {
        param.validate()?;

        let rng = match param.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let schedule = ExplorationSchedule::new(
            param.epsilon_initial,
            param.epsilon_final,
            param.observe_threshold,
            param.explore_span,
        );

        Ok(Self {
            environment,
            preprocessor,
            model,
            checkpoint,
            rng,
            frame_stack: FrameStack::new(param.frame_stack_depth),
            schedule,
            replay_memory: ReplayBuffer::new(param.replay_memory_capacity),
            episode_reward_history: ReplayBuffer::new(param.episode_reward_history_buffer_len),
            param: Immutable::new(param),
            state: None,
            episode_count: 0,
            episode_step: 0,
            episode_reward: 0.0,
            running_reward: 0.0,
            last_loss: None,
        })
    }

    pub fn model(&self) -> &M { &self.model }

    pub fn environment(&self) -> &E { &self.environment }

    pub fn replay_memory(&self) -> &ReplayMemory { &self.replay_memory }

    pub fn progress(&self) -> LearningProgress {
        LearningProgress {
            episode_count: self.episode_count,
            episode_step: self.episode_step,
            elapsed_steps: self.schedule.elapsed_steps(),
            phase: self.schedule.phase(),
            epsilon: self.schedule.epsilon(),
            running_reward: self.running_reward,
            last_loss: self.last_loss,
        }
    }

    /// Loads the most recent checkpoint into the model, if there is one.
    /// Step counters and replay memory are not part of a checkpoint - the observation phase starts over.
    pub fn restore_checkpoint(&mut self) -> Result<Option<usize>> { self.checkpoint.load(&mut self.model) }

    pub fn save_checkpoint(&self) -> Result<()> { self.checkpoint.save(&self.model, self.schedule.elapsed_steps()) }

    /// Runs steps until `stop` returns true, then writes a checkpoint.
    ///
    /// `stop` is evaluated between steps only, so a transition is never partially recorded.
    /// When the environment fails, a checkpoint is attempted before the error is returned.
    pub fn run_until<F>(
        &mut self,
        mut stop: F,
    ) -> Result<()>
    where
        F: FnMut(&LearningProgress) -> bool,
    {
        while !stop(&self.progress()) {
            self.checkpointed_step()?;
        }
        self.save_checkpoint()
    }

    /// Runs steps until the current (or next) episode is finished.
    /// When the environment fails, a checkpoint is attempted before the error is returned.
    pub fn learn_episode(&mut self) -> Result<()> {
        while !self.checkpointed_step()?.episode_finished {}
        Ok(())
    }

    fn checkpointed_step(&mut self) -> Result<StepOutcome> {
        self.step().map_err(|e| {
            if let Some(QlError::Environment(_)) = e.downcast_ref::<QlError>() {
                if let Err(checkpoint_error) = self.save_checkpoint() {
                    log::error!("checkpoint after environment failure failed: {:#}", checkpoint_error);
                }
            }
            e
        })
    }

    /// Performs one time/action-step in the environment, including the training update once the
    /// observation phase is over. Starts a new episode if none is running.
    pub fn step(&mut self) -> Result<StepOutcome> {
        let state = match self.state.take() {
            Some(state) => state,
            None => self.begin_episode()?,
        };

        // Use epsilon-greedy for exploration
        let action = self
            .schedule
            .select_action(&state, self.param.action_space, &self.model, &mut self.rng)?;

        // Apply the sampled action in our environment
        let (observation, reward, terminal) = self.environment.step(&action).map_err(QlError::environment)?;
        let frame = self.preprocessor.preprocess(&observation).map_err(QlError::environment)?;
        let state_next = Rc::new(self.frame_stack.advance(&state, frame).map_err(QlError::environment)?);
        log::trace!("step with action {} resulted in reward: {:.2}, terminal: {}", action, reward, terminal);

        // Save actions and states in replay memory
        self.replay_memory
            .append(Transition::new(state, action, reward, Rc::clone(&state_next), terminal));
        self.schedule.advance(1);
        self.episode_step += 1;
        self.episode_reward += reward;

        let trained = self.schedule.elapsed_steps() > self.param.observe_threshold;
        if trained {
            self.train()?;
        }

        if self.schedule.elapsed_steps() % self.param.stats_after_steps.max(1) == 0 {
            self.learning_update_log();
        }

        let episode_finished = terminal || self.episode_step >= self.param.max_steps_per_episode;
        if episode_finished {
            self.finish_episode();
        } else {
            self.state = Some(state_next);
        }

        Ok(StepOutcome {
            reward,
            terminal,
            episode_finished,
            trained,
        })
    }

    fn begin_episode(&mut self) -> Result<Rc<StackedFrames>> {
        let observation = self.environment.reset().map_err(QlError::environment)?;
        let frame = self.preprocessor.preprocess(&observation).map_err(QlError::environment)?;
        self.episode_step = 0;
        self.episode_reward = 0.0;
        log::trace!("started learning episode {}", self.episode_count);
        Ok(Rc::new(self.frame_stack.initialize(frame)))
    }

    fn train(&mut self) -> Result<()> {
        let loss = training_step::run(
            &self.replay_memory,
            &mut self.model,
            self.param.batch_size,
            self.param.gamma,
            &mut self.rng,
        )
        .map_err(|e| {
            if let Some(QlError::InsufficientData { .. }) = e.downcast_ref::<QlError>() {
                log::error!(
                    "invariant violated: training after {} steps with {} remembered transitions",
                    self.schedule.elapsed_steps(),
                    self.replay_memory.len()
                );
            }
            e
        })?;
        self.last_loss = Some(loss);
        Ok(())
    }

    fn finish_episode(&mut self) {
        self.episode_reward_history.append(self.episode_reward);
        self.running_reward = self.episode_reward_history.avg();
        self.episode_count += 1;
        log::debug!(
            "episode: {} / episode step: {} / phase: {} / 𝜀: {:.4} / reward: {:.2}",
            self.episode_count,
            self.episode_step,
            self.schedule.phase(),
            self.schedule.epsilon(),
            self.episode_reward
        );
    }

    fn learning_update_log(&self) {
        let number_format = format::number_format();

        let mut action_counts = FxHashMap::<usize, usize>::default();
        for t in self.replay_memory.iter() {
            action_counts.entry(t.action().index()).and_modify(|e| *e += 1).or_insert(1);
        }
        let total_actions = self.replay_memory.len();
        let action_distribution_line = action_counts
            .iter()
            .sorted()
            .map(|(&action, &count)| {
                let ratio = 100.0 * count as f32 / total_actions as f32;
                format!("a{} {:.1}%", action, ratio)
            })
            .join(", ");

        log::info!(
            "\n\
    episode: {}, steps: {}, phase: {}, 𝛾={:.2}, 𝜀={:.4}, running_reward: {:.2}, loss: {}\n\
    action_distribution (of last {}): {}",
            self.episode_count.to_formatted_string(&number_format),
            self.schedule.elapsed_steps().to_formatted_string(&number_format),
            self.schedule.phase(),
            self.param.gamma,
            self.schedule.epsilon(),
            self.running_reward,
            self.last_loss.map_or("-".to_string(), |l| format!("{:.5}", l)),
            total_actions.to_formatted_string(&number_format),
            action_distribution_line
        );
    }
}
