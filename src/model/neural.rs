//! Single-hidden-layer perceptron regressor trained with Adam.

use super::Regressor;
use crate::error::{ForecastError, Result};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// MLP configuration
#[derive(Debug, Clone)]
pub struct MLPConfig {
    pub hidden_units: usize,
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub batch_size: usize,
    /// L2 penalty
    pub alpha: f64,
    pub random_state: u64,
}

impl Default for MLPConfig {
    fn default() -> Self {
        Self {
            hidden_units: 100,
            learning_rate: 0.001,
            max_epochs: 200,
            batch_size: 200,
            alpha: 0.0001,
            random_state: 42,
        }
    }
}

/// Per-feature standardisation learned at fit time.
#[derive(Debug, Clone)]
struct Scaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl Scaler {
    fn fit(x: &DMatrix<f64>) -> Self {
        let n = x.nrows().max(1) as f64;
        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());
        for col in x.column_iter() {
            let m = col.sum() / n;
            let var = col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            mean.push(m);
            scale.push(if var > 0.0 { var.sqrt() } else { 1.0 });
        }
        Self { mean, scale }
    }

    fn transform(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| (x[(i, j)] - self.mean[j]) / self.scale[j])
    }
}

#[derive(Debug, Clone)]
struct Network {
    w1: DMatrix<f64>,
    b1: DVector<f64>,
    w2: DVector<f64>,
    b2: f64,
}

impl Network {
    /// Glorot-uniform initialisation.
    fn init(n_in: usize, hidden: usize, rng: &mut StdRng) -> Self {
        let limit1 = (6.0 / (n_in + hidden) as f64).sqrt();
        let limit2 = (6.0 / (hidden + 1) as f64).sqrt();
        Self {
            w1: DMatrix::from_fn(n_in, hidden, |_, _| rng.gen_range(-limit1..limit1)),
            b1: DVector::from_fn(hidden, |_, _| rng.gen_range(-limit1..limit1)),
            w2: DVector::from_fn(hidden, |_, _| rng.gen_range(-limit2..limit2)),
            b2: rng.gen_range(-limit2..limit2),
        }
    }

    /// Returns hidden pre-activations and outputs.
    fn forward(&self, x: &DMatrix<f64>) -> (DMatrix<f64>, DVector<f64>) {
        let mut z = x * &self.w1;
        for mut row in z.row_iter_mut() {
            for (v, b) in row.iter_mut().zip(self.b1.iter()) {
                *v += b;
            }
        }
        let h = z.map(|v| v.max(0.0));
        let mut out = &h * &self.w2;
        out.add_scalar_mut(self.b2);
        (z, out)
    }
}

/// Adam moment buffers mirroring the network's parameters.
#[derive(Debug, Clone)]
struct Adam {
    m: Network,
    v: Network,
    t: i32,
}

impl Adam {
    const BETA1: f64 = 0.9;
    const BETA2: f64 = 0.999;
    const EPS: f64 = 1e-8;

    fn new(n_in: usize, hidden: usize) -> Self {
        let zero = Network {
            w1: DMatrix::zeros(n_in, hidden),
            b1: DVector::zeros(hidden),
            w2: DVector::zeros(hidden),
            b2: 0.0,
        };
        Self { m: zero.clone(), v: zero, t: 0 }
    }

    fn step(&mut self, net: &mut Network, grad: &Network, lr: f64) {
        self.t += 1;
        let c1 = 1.0 - Self::BETA1.powi(self.t);
        let c2 = 1.0 - Self::BETA2.powi(self.t);
        let update = |p: &mut f64, g: f64, m: &mut f64, v: &mut f64| {
            *m = Self::BETA1 * *m + (1.0 - Self::BETA1) * g;
            *v = Self::BETA2 * *v + (1.0 - Self::BETA2) * g * g;
            *p -= lr * (*m / c1) / ((*v / c2).sqrt() + Self::EPS);
        };

        for ((p, g), (m, v)) in net
            .w1
            .iter_mut()
            .zip(grad.w1.iter())
            .zip(self.m.w1.iter_mut().zip(self.v.w1.iter_mut()))
        {
            update(p, *g, m, v);
        }
        for ((p, g), (m, v)) in net
            .b1
            .iter_mut()
            .zip(grad.b1.iter())
            .zip(self.m.b1.iter_mut().zip(self.v.b1.iter_mut()))
        {
            update(p, *g, m, v);
        }
        for ((p, g), (m, v)) in net
            .w2
            .iter_mut()
            .zip(grad.w2.iter())
            .zip(self.m.w2.iter_mut().zip(self.v.w2.iter_mut()))
        {
            update(p, *g, m, v);
        }
        update(&mut net.b2, grad.b2, &mut self.m.b2, &mut self.v.b2);
    }
}

/// Multi-layer perceptron regressor (one ReLU hidden layer, linear output).
///
/// Inputs and target are standardised internally; predictions are returned
/// on the original target scale.
#[derive(Debug, Clone)]
pub struct MLPRegressor {
    config: MLPConfig,
    network: Option<Network>,
    x_scaler: Option<Scaler>,
    y_mean: f64,
    y_scale: f64,
}

impl MLPRegressor {
    pub fn new(config: MLPConfig) -> Self {
        Self { config, network: None, x_scaler: None, y_mean: 0.0, y_scale: 1.0 }
    }

    fn gather_rows(x: &DMatrix<f64>, rows: &[usize]) -> DMatrix<f64> {
        DMatrix::from_fn(rows.len(), x.ncols(), |i, j| x[(rows[i], j)])
    }

    /// Gradient of `sum(w·(out−y)²) / (2·sum(w)) + alpha/2·|W|²` on one batch.
    fn gradients(&self, net: &Network, x: &DMatrix<f64>, y: &DVector<f64>, w: &DVector<f64>) -> Network {
        let (z, out) = net.forward(x);
        let h = z.map(|v| v.max(0.0));
        let total_w = w.sum().max(f64::EPSILON);

        let delta_out = DVector::from_fn(out.len(), |i, _| w[i] * (out[i] - y[i]) / total_w);
        let mut grad_w2 = h.transpose() * &delta_out;
        let grad_b2 = delta_out.sum();

        // Back through the ReLU.
        let mut delta_hidden = &delta_out * net.w2.transpose();
        for (d, zi) in delta_hidden.iter_mut().zip(z.iter()) {
            if *zi <= 0.0 {
                *d = 0.0;
            }
        }
        let mut grad_w1 = x.transpose() * &delta_hidden;
        let grad_b1 = DVector::from_fn(delta_hidden.ncols(), |j, _| delta_hidden.column(j).sum());

        let penalty = self.config.alpha / x.nrows().max(1) as f64;
        grad_w1 += &net.w1 * penalty;
        grad_w2 += &net.w2 * penalty;

        Network { w1: grad_w1, b1: grad_b1, w2: grad_w2, b2: grad_b2 }
    }
}

impl Default for MLPRegressor {
    fn default() -> Self { Self::new(MLPConfig::default()) }
}

impl Regressor for MLPRegressor {
    fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>, weights: &DVector<f64>) -> Result<()> {
        let n = x.nrows();
        if n == 0 {
            return Err(ForecastError::InsufficientData("cannot fit a network on zero rows".into()));
        }

        let scaler = Scaler::fit(x);
        let xs = scaler.transform(x);
        let y_mean = y.mean();
        let y_var = y.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>() / n as f64;
        let y_scale = if y_var > 0.0 { y_var.sqrt() } else { 1.0 };
        let ys = y.map(|v| (v - y_mean) / y_scale);

        let mut rng = StdRng::seed_from_u64(self.config.random_state);
        let mut net = Network::init(x.ncols(), self.config.hidden_units, &mut rng);
        let mut adam = Adam::new(x.ncols(), self.config.hidden_units);
        let batch_size = self.config.batch_size.clamp(1, n);
        let mut indices: Vec<usize> = (0..n).collect();

        for _epoch in 0..self.config.max_epochs {
            indices.shuffle(&mut rng);
            for batch in indices.chunks(batch_size) {
                let xb = Self::gather_rows(&xs, batch);
                let yb = DVector::from_fn(batch.len(), |i, _| ys[batch[i]]);
                let wb = DVector::from_fn(batch.len(), |i, _| weights[batch[i]]);
                let grad = self.gradients(&net, &xb, &yb, &wb);
                adam.step(&mut net, &grad, self.config.learning_rate);
            }
        }

        self.network = Some(net);
        self.x_scaler = Some(scaler);
        self.y_mean = y_mean;
        self.y_scale = y_scale;
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>> {
        let (net, scaler) = match (&self.network, &self.x_scaler) {
            (Some(net), Some(scaler)) => (net, scaler),
            _ => return Err(ForecastError::NotFitted),
        };
        if x.ncols() != scaler.mean.len() {
            return Err(ForecastError::InvalidData(format!(
                "expected {} features, got {}",
                scaler.mean.len(),
                x.ncols()
            )));
        }
        let (_, out) = net.forward(&scaler.transform(x));
        Ok(out.map(|v| v * self.y_scale + self.y_mean))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mlp_fits_linear_trend() {
        let x = DMatrix::from_fn(50, 1, |i, _| i as f64);
        let y = DVector::from_fn(50, |i, _| 10.0 + 3.0 * i as f64);
        let mut mlp = MLPRegressor::new(MLPConfig { max_epochs: 500, learning_rate: 0.01, ..Default::default() });
        mlp.fit(&x, &y, &DVector::from_element(50, 1.0)).unwrap();

        let pred = mlp.predict(&x).unwrap();
        let mean_abs: f64 = (pred - &y).iter().map(|r| r.abs()).sum::<f64>() / 50.0;
        assert!(mean_abs < 5.0, "mean abs error {}", mean_abs);
    }

    #[test]
    fn test_mlp_is_deterministic() {
        let x = DMatrix::from_fn(20, 2, |i, j| (i + j) as f64);
        let y = DVector::from_fn(20, |i, _| i as f64);
        let w = DVector::from_element(20, 1.0);
        let cfg = MLPConfig { max_epochs: 20, ..Default::default() };

        let mut a = MLPRegressor::new(cfg.clone());
        let mut b = MLPRegressor::new(cfg);
        a.fit(&x, &y, &w).unwrap();
        b.fit(&x, &y, &w).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_mlp_rejects_wrong_width() {
        let x = DMatrix::from_fn(10, 2, |i, _| i as f64);
        let y = DVector::from_fn(10, |i, _| i as f64);
        let mut mlp = MLPRegressor::new(MLPConfig { max_epochs: 1, ..Default::default() });
        mlp.fit(&x, &y, &DVector::from_element(10, 1.0)).unwrap();
        assert!(mlp.predict(&DMatrix::zeros(1, 3)).is_err());
    }
}
