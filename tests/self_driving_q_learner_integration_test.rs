use anyhow::Result;

use pixel_q_learning::ql::learn::exploration::Phase;
use pixel_q_learning::ql::learn::self_driving_q_learner::SelfDrivingQLearner;
use pixel_q_learning::ql::ml_model::checkpoint::{Checkpoint, FileCheckpoint};
use pixel_q_learning::ql::ml_model::model::DeepQLearningModel;

mod common;

#[test]
fn itest_learn_catch_game() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let param = common::param(7);
    let model = common::model(&param);
    let checkpoint = FileCheckpoint::new(dir.path(), common::CHECKPOINT_NAME);

    let mut learner = SelfDrivingQLearner::new(
        common::environment(7),
        common::preprocessor(),
        model,
        Box::new(checkpoint),
        param,
    )?;
    assert_eq!(learner.restore_checkpoint()?, None);

    learner.run_until(|p| p.elapsed_steps >= 300)?;

    let progress = learner.progress();
    assert_eq!(progress.elapsed_steps, 300);
    assert_eq!(progress.phase, Phase::Exploit);
    assert!((progress.epsilon - 0.1).abs() < 1e-9);
    assert!(progress.last_loss.map_or(false, |l| l.is_finite()));
    // a catch episode lasts height - 1 steps
    assert_eq!(progress.episode_count, 60);
    assert!((-1.0..=1.0).contains(&progress.running_reward));
    assert_eq!(learner.replay_memory().len(), 300);

    let saved = FileCheckpoint::new(dir.path(), common::CHECKPOINT_NAME);
    assert_eq!(saved.latest()?.map(|(_, step)| step), Some(300));
    Ok(())
}

#[test]
fn itest_restore_checkpoint() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let param = common::param(11);
    let mut learner = SelfDrivingQLearner::new(
        common::environment(11),
        common::preprocessor(),
        common::model(&param),
        Box::new(FileCheckpoint::new(dir.path(), common::CHECKPOINT_NAME)),
        param,
    )?;
    learner.run_until(|p| p.episode_count >= 15)?;

    let param = common::param(11);
    let mut restored = common::model(&param);
    let checkpoint = FileCheckpoint::new(dir.path(), common::CHECKPOINT_NAME);
    assert_eq!(checkpoint.load(&mut restored)?, Some(75));

    let (file, _) = checkpoint.latest()?.unwrap();
    let mut reloaded = common::model(&param);
    reloaded.read_checkpoint(&file)?;

    let probe = pixel_q_learning::ql::frame_stack::FrameStack::new(param.frame_stack_depth)
        .initialize(image::GrayImage::new(common::FRAME_SIZE, common::FRAME_SIZE));
    assert_eq!(restored.predict(&probe)?, learner.model().predict(&probe)?);
    assert_eq!(reloaded.predict(&probe)?, learner.model().predict(&probe)?);
    Ok(())
}
