use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::Pattern;

use crate::ql::ml_model::model::DeepQLearningModel;

/// Persistence of a model between learning sessions.
/// Only used at the start and at the end of a learning run - never per step.
pub trait Checkpoint<M> {
    fn save(
        &self,
        model: &M,
        step_count: usize,
    ) -> Result<()>;

    /// Restores the most recent checkpoint into `model`.
    /// Returns the step count the checkpoint was written at or `None` if there is none.
    fn load(
        &self,
        model: &mut M,
    ) -> Result<Option<usize>>;
}

/// No persistence at all
pub struct NoCheckpoint;

impl<M> Checkpoint<M> for NoCheckpoint {
    fn save(
        &self,
        _model: &M,
        _step_count: usize,
    ) -> Result<()> {
        Ok(())
    }

    fn load(
        &self,
        _model: &mut M,
    ) -> Result<Option<usize>> {
        Ok(None)
    }
}

/// Checkpoint files `<dir>/<name>-<step_count>.safetensors`
pub struct FileCheckpoint {
    dir: PathBuf,
    name: String,
}

impl FileCheckpoint {
    pub fn new(
        dir: &Path,
        name: &str,
    ) -> Self {
        Self {
            dir: dir.to_path_buf(),
            name: name.to_string(),
        }
    }

    pub fn file(
        &self,
        step_count: usize,
    ) -> PathBuf {
        self.dir.join(format!("{}-{}.safetensors", self.name, step_count))
    }

    /// Most recent checkpoint file and its step count
    pub fn latest(&self) -> Result<Option<(PathBuf, usize)>> {
        // dir and name are literal parts of the pattern
        let dir = self.dir.to_str().context("checkpoint path should be UTF-8 compatible")?;
        let pattern = Path::new(&Pattern::escape(dir)).join(format!("{}-*.safetensors", Pattern::escape(&self.name)));
        let pattern = pattern.to_str().context("checkpoint path should be UTF-8 compatible")?;
        let prefix = format!("{}-", self.name);

        let mut latest: Option<(PathBuf, usize)> = None;
        for path in glob::glob(pattern)? {
            let path = path?;
            let step_count = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix(&prefix))
                .and_then(|s| s.parse::<usize>().ok());
            if let Some(step_count) = step_count {
                if latest.as_ref().map_or(true, |(_, s)| step_count > *s) {
                    latest = Some((path, step_count));
                }
            }
        }
        Ok(latest)
    }
}

impl<M: DeepQLearningModel> Checkpoint<M> for FileCheckpoint {
    fn save(
        &self,
        model: &M,
        step_count: usize,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| format!("creating checkpoint dir {}", self.dir.display()))?;
        let file = self.file(step_count);
        model.write_checkpoint(&file)?;
        log::info!("saved model to '{}'", file.display());
        Ok(())
    }

    fn load(
        &self,
        model: &mut M,
    ) -> Result<Option<usize>> {
        match self.latest()? {
            Some((file, step_count)) => {
                model.read_checkpoint(&file)?;
                log::info!("successfully loaded '{}'", file.display());
                Ok(Some(step_count))
            }
            None => {
                log::info!("could not find old model weights in '{}'", self.dir.display());
                Ok(None)
            }
        }
    }
}
