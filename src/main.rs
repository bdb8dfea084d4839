use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;

use pixel_q_learning::environment::catch_environment::{CatchEnvironment, CATCH_ACTION_SPACE};
use pixel_q_learning::environment::preprocess::BinaryThresholdPreprocessor;
use pixel_q_learning::ql::learn::self_driving_q_learner::{Parameter, SelfDrivingQLearner};
use pixel_q_learning::ql::ml_model::checkpoint::FileCheckpoint;
use pixel_q_learning::ql::ml_model::mlp_model::MlpQModel;
use pixel_q_learning::util;

const FRAME_SIZE: u32 = 20;

/// Learns to play the catch pixel game with Deep-Q-Learning
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Learning time budget in minutes
    #[arg(short, long, default_value_t = 5)]
    minutes: u64,

    /// Stop after this many finished episodes
    #[arg(short, long, required = false)]
    episodes: Option<usize>,

    /// Directory for the model checkpoints
    #[arg(long, default_value = "save_model")]
    checkpoint_dir: PathBuf,

    /// Checkpoint file name prefix
    #[arg(long, default_value = "catch-dqn")]
    name: String,

    /// Seed for the game and the learner; random if unset
    #[arg(long, required = false)]
    seed: Option<u64>,

    /// Steps to observe before training starts
    #[arg(long, required = false)]
    observe: Option<usize>,

    /// Steps over which epsilon anneals to its final value
    #[arg(long, required = false)]
    explore: Option<usize>,

    #[arg(long, default_value_t = 1.0)]
    epsilon_initial: f64,

    #[arg(long, default_value_t = 0.05)]
    epsilon_final: f64,

    #[arg(long, default_value_t = 1e-3)]
    learning_rate: f64,
}

fn main() -> Result<()> {
    util::init_logging();
    let args = Args::parse();

    let default = Parameter::default();
    let param = Parameter {
        action_space: CATCH_ACTION_SPACE,
        epsilon_initial: args.epsilon_initial,
        epsilon_final: args.epsilon_final,
        observe_threshold: args.observe.unwrap_or(1_000),
        explore_span: args.explore.unwrap_or(20_000),
        replay_memory_capacity: 10_000,
        random_seed: args.seed,
        ..default
    };

    let environment = CatchEnvironment::new(10, 10, 4, args.seed);
    let preprocessor = BinaryThresholdPreprocessor::new(FRAME_SIZE, FRAME_SIZE, 60);
    let input_len = param.frame_stack_depth * (FRAME_SIZE * FRAME_SIZE) as usize;
    let model = MlpQModel::new(input_len, &[256], CATCH_ACTION_SPACE as usize, args.learning_rate)?;
    let checkpoint = FileCheckpoint::new(&args.checkpoint_dir, &args.name);

    let mut learner = SelfDrivingQLearner::new(environment, preprocessor, model, Box::new(checkpoint), param)?;
    learner.restore_checkpoint()?;

    let deadline = Instant::now() + Duration::from_secs(args.minutes * 60);
    learner.run_until(|progress| {
        Instant::now() >= deadline || args.episodes.map_or(false, |max| progress.episode_count >= max)
    })?;

    let progress = learner.progress();
    log::info!(
        "finished after {} episodes / {} steps, running reward: {:.2}",
        progress.episode_count,
        progress.elapsed_steps,
        progress.running_reward
    );
    Ok(())
}
