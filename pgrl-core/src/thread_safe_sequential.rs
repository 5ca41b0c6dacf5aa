use candle_core::{Result, Tensor};
use candle_nn::{Activation, Linear, Module, VarBuilder, linear};

#[derive(Debug, Clone)]
pub struct LinearLayer {
    layer: Linear,
    in_dim: usize,
    out_dim: usize,
}

impl LinearLayer {
    pub fn new(in_dim: usize, out_dim: usize, vb: &VarBuilder, prefix: &str) -> Result<Self> {
        let layer = linear(in_dim, out_dim, vb.pp(prefix))?;
        Ok(Self {
            layer,
            in_dim,
            out_dim,
        })
    }
}

impl Module for LinearLayer {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.layer.forward(xs)
    }
}

#[derive(Debug, Clone)]
pub enum ThreadSafeLayer {
    Linear(LinearLayer),
    Activation(Activation),
}

impl Module for ThreadSafeLayer {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        match self {
            Self::Linear(linear) => linear.forward(xs),
            Self::Activation(activation) => activation.forward(xs),
        }
    }
}

/// A sequential stack of layers that, unlike `candle_nn::Sequential`, is `Send + Sync` and can
/// be shared between networks.
#[derive(Default, Debug, Clone)]
pub struct ThreadSafeSequential {
    layers: Vec<ThreadSafeLayer>,
}

impl Module for ThreadSafeSequential {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.clone();
        for layer in self.layers.iter() {
            xs = layer.forward(&xs)?
        }
        Ok(xs)
    }
}

impl ThreadSafeSequential {
    pub fn add_layer(mut self, layer: ThreadSafeLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Output width of the last linear layer, if any.
    pub fn out_dim(&self) -> Option<usize> {
        self.layers.iter().rev().find_map(|layer| match layer {
            ThreadSafeLayer::Linear(linear) => Some(linear.out_dim),
            ThreadSafeLayer::Activation(_) => None,
        })
    }

    pub fn in_dim(&self) -> Option<usize> {
        self.layers.iter().find_map(|layer| match layer {
            ThreadSafeLayer::Linear(linear) => Some(linear.in_dim),
            ThreadSafeLayer::Activation(_) => None,
        })
    }
}

/// Linear layers of the given sizes with a ReLU between them. With `activate_last` the final
/// layer is followed by a ReLU as well, which is what feature extracting bodies want.
pub fn build_sequential(
    input_dim: usize,
    layers: &[usize],
    vb: &VarBuilder,
    prefix: &str,
    activate_last: bool,
) -> Result<ThreadSafeSequential> {
    let mut last_dim = input_dim;
    let mut nn = ThreadSafeSequential::default();
    let num_layers = layers.len();
    for (layer_idx, layer_size) in layers.iter().enumerate() {
        let layer_pp = format!("{prefix}{layer_idx}");
        let layer = LinearLayer::new(last_dim, *layer_size, vb, &layer_pp)?;
        nn = nn.add_layer(ThreadSafeLayer::Linear(layer));
        if activate_last || layer_idx != num_layers - 1 {
            nn = nn.add_layer(ThreadSafeLayer::Activation(Activation::Relu));
        }
        last_dim = *layer_size;
    }
    Ok(nn)
}

#[cfg(test)]
mod tests {
    use super::build_sequential;
    use candle_core::{DType, Device, Module, Result, Tensor};
    use candle_nn::{VarBuilder, VarMap};

    #[test]
    fn layers_are_registered_under_the_prefix() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let nn = build_sequential(3, &[8, 2], &vb, "body", false)?;
        assert_eq!(nn.in_dim(), Some(3));
        assert_eq!(nn.out_dim(), Some(2));
        let data = varmap.data().lock().unwrap();
        assert!(data.contains_key("body0.weight"));
        assert!(data.contains_key("body1.bias"));
        drop(data);
        let xs = Tensor::zeros((5, 3), DType::F32, &Device::Cpu)?;
        assert_eq!(nn.forward(&xs)?.dims(), &[5, 2]);
        Ok(())
    }
}
