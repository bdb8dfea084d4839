use std::iter::once;
use std::path::Path;

use anyhow::{ensure, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{linear, AdamW, Linear, Module, Optimizer, ParamsAdamW, VarBuilder, VarMap};

use crate::ql::frame_stack::StackedFrames;
use crate::ql::ml_model::model::DeepQLearningModel;
use crate::ql::prelude::OneHotAction;

/// Multi-layer perceptron over the flattened stacked frames, with ReLU activation between layers.
pub struct MlpQModel {
    layers: Vec<Linear>,
    var_map: VarMap,
    optimizer: AdamW,
    input_len: usize,
    action_space: usize,
    device: Device,
}

impl MlpQModel {
    /// # Arguments
    /// * `input_len` length of the state input vector; e.g. 4 frames of 20x20 pixel = 1600
    /// * `hidden_layers` sizes of the hidden layers
    /// * `action_space` number of possible actions = size of the model's output vector
    /// * `learning_rate` of the AdamW optimizer
    pub fn new(
        input_len: usize,
        hidden_layers: &[usize],
        action_space: usize,
        learning_rate: f64,
    ) -> Result<Self> {
        let device = Device::Cpu;
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, &device);

        let topology: Vec<usize> = once(input_len)
            .chain(hidden_layers.iter().copied())
            .chain(once(action_space))
            .collect();
        let layers = topology
            .windows(2)
            .enumerate()
            .map(|(i, dims)| linear(dims[0], dims[1], vb.pp(format!("layer{}", i))))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let optimizer = AdamW::new(
            var_map.all_vars(),
            ParamsAdamW {
                lr: learning_rate,
                ..Default::default()
            },
        )?;

        Ok(Self {
            layers,
            var_map,
            optimizer,
            input_len,
            action_space,
            device,
        })
    }

    fn forward(
        &self,
        input: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let mut x = input.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if i + 1 < self.layers.len() {
                x = x.relu()?;
            }
        }
        Ok(x)
    }

    fn state_batch_tensor(
        &self,
        states: &[&StackedFrames],
    ) -> Result<Tensor> {
        let mut data = Vec::with_capacity(states.len() * self.input_len);
        for state in states {
            ensure!(
                state.input_len() == self.input_len,
                "state dimension mismatch. Expected {}, got {}",
                self.input_len,
                state.input_len()
            );
            data.extend(state.to_input_vector());
        }
        Ok(Tensor::from_vec(data, (states.len(), self.input_len), &self.device)?)
    }
}

impl DeepQLearningModel for MlpQModel {
    fn predict(
        &self,
        state: &StackedFrames,
    ) -> Result<Vec<f32>> {
        let mut r = self.batch_predict(&[state])?;
        Ok(r.remove(0))
    }

    fn batch_predict(
        &self,
        states: &[&StackedFrames],
    ) -> Result<Vec<Vec<f32>>> {
        let input = self.state_batch_tensor(states)?;
        Ok(self.forward(&input)?.to_vec2::<f32>()?)
    }

    fn train(
        &mut self,
        state_batch: &[&StackedFrames],
        action_batch: &[OneHotAction],
        updated_q_values: &[f32],
    ) -> Result<f32> {
        let batch_size = state_batch.len();
        ensure!(
            action_batch.len() == batch_size && updated_q_values.len() == batch_size,
            "batch length mismatch: {} states, {} actions, {} targets",
            batch_size,
            action_batch.len(),
            updated_q_values.len()
        );
        ensure!(
            action_batch.iter().all(|a| a.action_space() == self.action_space),
            "action space mismatch. Expected {}",
            self.action_space
        );

        let states = self.state_batch_tensor(state_batch)?;
        // mask, so we only calculate the loss on the q-values of the taken actions
        let masks: Vec<f32> = action_batch.iter().flat_map(|a| a.to_vec()).collect();
        let masks = Tensor::from_vec(masks, (batch_size, self.action_space), &self.device)?;
        let targets = Tensor::from_slice(updated_q_values, batch_size, &self.device)?;

        let q_values = self.forward(&states)?;
        let q_action = q_values.mul(&masks)?.sum(1)?;
        let loss = candle_nn::loss::mse(&q_action, &targets)?;
        self.optimizer.backward_step(&loss)?;

        Ok(loss.to_scalar::<f32>()?)
    }

    fn write_checkpoint(
        &self,
        file: &Path,
    ) -> Result<()> {
        self.var_map.save(file)?;
        Ok(())
    }

    fn read_checkpoint(
        &mut self,
        file: &Path,
    ) -> Result<()> {
        self.var_map.load(file)?;
        Ok(())
    }
}
