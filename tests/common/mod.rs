use log::LevelFilter;

use pixel_q_learning::environment::catch_environment::{CatchEnvironment, CATCH_ACTION_SPACE};
use pixel_q_learning::environment::preprocess::BinaryThresholdPreprocessor;
use pixel_q_learning::ql::learn::self_driving_q_learner::Parameter;
use pixel_q_learning::ql::ml_model::mlp_model::MlpQModel;

pub const FRAME_SIZE: u32 = 8;
pub const CHECKPOINT_NAME: &str = "itest-catch";

#[ctor::ctor]
fn init_test_logging() {
    let _ = env_logger::builder()
        .format_timestamp_secs()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .is_test(true)
        .try_init();
}

pub fn param(seed: u64) -> Parameter {
    Parameter {
        action_space: CATCH_ACTION_SPACE,
        epsilon_initial: 1.0,
        epsilon_final: 0.1,
        observe_threshold: 50,
        explore_span: 200,
        replay_memory_capacity: 500,
        batch_size: 16,
        frame_stack_depth: 2,
        max_steps_per_episode: 50,
        episode_reward_history_buffer_len: 20,
        stats_after_steps: 100,
        random_seed: Some(seed),
        ..Parameter::default()
    }
}

pub fn environment(seed: u64) -> CatchEnvironment { CatchEnvironment::new(5, 6, 2, Some(seed)) }

pub fn preprocessor() -> BinaryThresholdPreprocessor { BinaryThresholdPreprocessor::new(FRAME_SIZE, FRAME_SIZE, 60) }

pub fn model(param: &Parameter) -> MlpQModel {
    let input_len = param.frame_stack_depth * (FRAME_SIZE * FRAME_SIZE) as usize;
    MlpQModel::new(input_len, &[32], param.action_space as usize, 1e-3).unwrap()
}
