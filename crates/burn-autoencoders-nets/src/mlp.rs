//! Multi-layer perceptron

use burn::module::Ignored;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;

use crate::nonlin::Nonlinearity;

/// Fully-connected stack with a shared hidden nonlinearity
///
/// Inputs of any rank are flattened to `[batch, features]` first.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    layers: Vec<Linear<B>>,
    nonlin: Ignored<Nonlinearity>,
    out_nonlin: Ignored<Option<Nonlinearity>>,
}

impl<B: Backend> Mlp<B> {
    /// Creates `din -> hidden[0] -> ... -> dout`
    pub fn new(
        din: usize,
        dout: usize,
        hidden: &[usize],
        nonlin: Nonlinearity,
        out_nonlin: Option<Nonlinearity>,
        device: &B::Device,
    ) -> Self {
        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut width = din;
        for &h in hidden.iter().chain(std::iter::once(&dout)) {
            layers.push(LinearConfig::new(width, h).init(device));
            width = h;
        }

        Self {
            layers,
            nonlin: Ignored(nonlin),
            out_nonlin: Ignored(out_nonlin),
        }
    }

    /// Forward pass on a flattened `[batch, din]` input
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len() - 1;
        let mut h = x;
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.forward(h);
            if i < last {
                h = self.nonlin.apply(h);
            } else if let Some(out) = self.out_nonlin.0 {
                h = out.apply(h);
            }
        }
        h
    }

    /// Flattens all but the batch dimension, then runs [`Self::forward`]
    pub fn forward_flat<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, 2> {
        let dims = x.dims();
        let batch = dims[0];
        let features = dims[1..].iter().product::<usize>();
        self.forward(x.reshape([batch, features]))
    }

    pub fn din(&self) -> usize {
        self.layers[0].weight.val().dims()[0]
    }

    pub fn dout(&self) -> usize {
        self.layers[self.layers.len() - 1].weight.val().dims()[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_mlp_shapes() {
        let device = Default::default();
        let mlp = Mlp::<TestBackend>::new(12, 5, &[8, 8], Nonlinearity::Relu, None, &device);
        assert_eq!(mlp.din(), 12);
        assert_eq!(mlp.dout(), 5);

        let x = Tensor::<TestBackend, 4>::zeros([3, 3, 2, 2], &device);
        assert_eq!(mlp.forward_flat(x).dims(), [3, 5]);
    }

    #[test]
    fn test_mlp_out_nonlin() {
        let device = Default::default();
        let mlp = Mlp::<TestBackend>::new(
            4,
            6,
            &[],
            Nonlinearity::Relu,
            Some(Nonlinearity::Sigmoid),
            &device,
        );

        let x = Tensor::<TestBackend, 2>::random(
            [2, 4],
            burn::tensor::Distribution::Normal(0.0, 10.0),
            &device,
        );
        let y: Vec<f32> = mlp.forward(x).into_data().to_vec().unwrap();
        assert!(y.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}
