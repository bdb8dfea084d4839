use anyhow::{bail, Result};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ql::prelude::{Environment, ModelActionType, OneHotAction};

pub const CATCH_ACTION_SPACE: ModelActionType = 3;

const BACKGROUND: Rgb<u8> = Rgb([20, 20, 60]);
const BALL: Rgb<u8> = Rgb([250, 200, 40]);
const PADDLE: Rgb<u8> = Rgb([90, 220, 250]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchAction {
    Stay,
    Left,
    Right,
}

impl CatchAction {
    fn from_one_hot(action: &OneHotAction) -> Result<Self> {
        if action.action_space() != CATCH_ACTION_SPACE as usize {
            bail!("expected an action space of {}, got {}", CATCH_ACTION_SPACE, action.action_space());
        }
        Ok(match action.index() {
            0 => CatchAction::Stay,
            1 => CatchAction::Left,
            _ => CatchAction::Right,
        })
    }

    pub fn one_hot(self) -> OneHotAction {
        let index = match self {
            CatchAction::Stay => 0,
            CatchAction::Left => 1,
            CatchAction::Right => 2,
        };
        OneHotAction::new(index, CATCH_ACTION_SPACE).expect("catch actions are within the action space")
    }
}

/// A simple pixel game.
///
/// `width` x `height` field (y=0 top / y=height-1 bottom)
/// - A ball starts in a random column of the top row and falls one row per step
/// - A paddle (one cell) on the bottom row, moved by the actions: stay, left, right
/// - Game goal: catch the ball. +1.0 when the ball lands on the paddle, -1.0 when it misses. Both end the episode.
///
/// Observations are RGB frames with `cell_size` x `cell_size` pixels per field cell.
pub struct CatchEnvironment {
    width: usize,
    height: usize,
    cell_size: u32,
    ball: (usize, usize),
    paddle_x: usize,
    done: bool,
    rng: StdRng,
}

impl CatchEnvironment {
    pub fn new(
        width: usize,
        height: usize,
        cell_size: u32,
        seed: Option<u64>,
    ) -> Self {
        assert!(width > 0 && height > 1 && cell_size > 0);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            width,
            height,
            cell_size,
            ball: (0, 0),
            paddle_x: width / 2,
            done: true,
            rng,
        }
    }

    pub fn ball(&self) -> (usize, usize) { self.ball }

    pub fn paddle_x(&self) -> usize { self.paddle_x }

    /// Frame size in pixels
    pub fn frame_dims(&self) -> (u32, u32) { (self.width as u32 * self.cell_size, self.height as u32 * self.cell_size) }

    pub fn render(&self) -> RgbImage {
        let (w, h) = self.frame_dims();
        let cell_size = self.cell_size;
        let cell_of = |px: u32, py: u32| ((px / cell_size) as usize, (py / cell_size) as usize);
        RgbImage::from_fn(w, h, |px, py| {
            let cell = cell_of(px, py);
            if cell == self.ball {
                BALL
            } else if cell == (self.paddle_x, self.height - 1) {
                PADDLE
            } else {
                BACKGROUND
            }
        })
    }
}

impl Environment for CatchEnvironment {
    type Observation = RgbImage;

    fn reset(&mut self) -> Result<RgbImage> {
        self.ball = (self.rng.gen_range(0..self.width), 0);
        self.paddle_x = self.width / 2;
        self.done = false;
        Ok(self.render())
    }

    fn step(
        &mut self,
        action: &OneHotAction,
    ) -> Result<(RgbImage, f32, bool)> {
        if self.done {
            bail!("episode finished - reset required");
        }
        match CatchAction::from_one_hot(action)? {
            CatchAction::Stay => (),
            CatchAction::Left => self.paddle_x = self.paddle_x.saturating_sub(1),
            CatchAction::Right => self.paddle_x = usize::min(self.paddle_x + 1, self.width - 1),
        }
        self.ball.1 += 1;

        let reward = if self.ball.1 == self.height - 1 {
            self.done = true;
            match self.ball.0 == self.paddle_x {
                true => 1.0,
                false => -1.0,
            }
        } else {
            0.0
        };
        Ok((self.render(), reward, self.done))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_without_reset_fails() {
        let mut env = CatchEnvironment::new(5, 5, 2, Some(1));
        assert!(env.step(&CatchAction::Stay.one_hot()).is_err());
    }

    #[test]
    fn test_catch_ball() -> Result<()> {
        let mut env = CatchEnvironment::new(5, 6, 2, Some(3));
        env.reset()?;
        let mut total_reward = 0.0;
        loop {
            let action = match env.ball().0.cmp(&env.paddle_x()) {
                std::cmp::Ordering::Less => CatchAction::Left,
                std::cmp::Ordering::Equal => CatchAction::Stay,
                std::cmp::Ordering::Greater => CatchAction::Right,
            };
            let (_, reward, done) = env.step(&action.one_hot())?;
            total_reward += reward;
            if done {
                break;
            }
        }
        assert_eq!(total_reward, 1.0);
        assert!(env.step(&CatchAction::Stay.one_hot()).is_err());
        Ok(())
    }

    #[test]
    fn test_miss_ball() -> Result<()> {
        let mut env = CatchEnvironment::new(5, 3, 2, Some(5));
        env.reset()?;
        // keep the paddle away from the ball
        let away = if env.ball().0 >= 2 { CatchAction::Left } else { CatchAction::Right };
        let (_, reward, done) = env.step(&away.one_hot())?;
        assert_eq!((reward, done), (0.0, false));
        let (_, reward, done) = env.step(&away.one_hot())?;
        assert_eq!((reward, done), (-1.0, true));
        Ok(())
    }

    #[test]
    fn test_paddle_stays_within_field() -> Result<()> {
        let mut env = CatchEnvironment::new(3, 10, 1, Some(9));
        env.reset()?;
        for _ in 0..4 {
            env.step(&CatchAction::Right.one_hot())?;
        }
        assert_eq!(env.paddle_x(), 2);
        Ok(())
    }

    #[test]
    fn test_wrong_action_space() -> Result<()> {
        let mut env = CatchEnvironment::new(3, 3, 1, Some(9));
        env.reset()?;
        assert!(env.step(&OneHotAction::new(0, 2)?).is_err());
        Ok(())
    }

    #[test]
    fn test_render() -> Result<()> {
        let mut env = CatchEnvironment::new(4, 5, 3, Some(11));
        let frame = env.reset()?;
        assert_eq!(frame.dimensions(), (12, 15));
        let (bx, by) = env.ball();
        assert_eq!(*frame.get_pixel(bx as u32 * 3 + 1, by as u32 * 3 + 1), BALL);
        assert_eq!(*frame.get_pixel(env.paddle_x() as u32 * 3, 14), PADDLE);
        Ok(())
    }
}
