use std::path::Path;

use anyhow::Context;
use rten::Model;
use rten_tensor::NdTensor;
use rten_tensor::prelude::*;

use super::{Classifier, InputLayout};

/// A `.rten` network with a single input and a `[1, 1]` (sigmoid) or
/// `[1, 2]` (softmax, index 1 is "crack") output.
pub struct RtenClassifier {
    model: Model,
    layout: InputLayout,
    width: u32,
    height: u32,
}

impl RtenClassifier {
    pub fn load(path: &Path, layout: InputLayout, width: u32, height: u32) -> anyhow::Result<Self> {
        if !path.exists() {
            anyhow::bail!("Classifier model not found at {}", path.display());
        }
        let model = Model::load_file(path)
            .with_context(|| format!("Failed to load classifier model {}", path.display()))?;
        Ok(Self {
            model,
            layout,
            width,
            height,
        })
    }

    fn input_len(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Classifier for RtenClassifier {
    fn predict(&self, input: &[f32]) -> anyhow::Result<f32> {
        if input.len() != self.input_len() {
            anyhow::bail!(
                "classifier expects {} inputs, got {}",
                self.input_len(),
                input.len()
            );
        }

        let output = match self.layout {
            InputLayout::Flat => {
                let tensor = NdTensor::from_data([1, input.len()], input.to_vec());
                self.model.run_one(tensor.view().into(), None)?
            }
            InputLayout::Nhwc => {
                let tensor = NdTensor::from_data(
                    [1, self.height as usize, self.width as usize, 1],
                    input.to_vec(),
                );
                self.model.run_one(tensor.view().into(), None)?
            }
        };

        let output: NdTensor<f32, 2> = output
            .try_into()
            .map_err(|e| anyhow::anyhow!("unexpected classifier output: {:?}", e))?;
        let scores: Vec<f32> = output.iter().copied().collect();
        match scores.as_slice() {
            [p] => Ok(*p),
            [_, crack] => Ok(*crack),
            other => anyhow::bail!("classifier produced {} scores, expected 1 or 2", other.len()),
        }
    }
}
