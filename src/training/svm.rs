/// One training example for the linear SVM
#[derive(Debug, Clone)]
pub struct Sample {
    pub features: Vec<f32>,
    /// +1.0 for objects, -1.0 for background
    pub label: f32,
}

/// Linear decision function `w·x + b`
#[derive(Debug, Clone)]
pub struct LinearModel {
    pub weights: Vec<f32>,
    pub bias: f32,
}

#[cfg(test)]
impl LinearModel {
    fn decision(&self, features: &[f32]) -> f32 {
        dot(&self.weights, features) + self.bias
    }
}

/// Solver settings
#[derive(Debug, Clone, Copy)]
pub struct SvmParams {
    pub c: f32,
    pub epsilon: f32,
    pub max_epochs: usize,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            epsilon: 0.01,
            max_epochs: 1000,
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Train an L1-loss linear SVM by dual coordinate descent.
///
/// The bias is learned as the weight of a constant feature of 1.0. Stops
/// once the projected gradient spread falls below `epsilon` or after
/// `max_epochs` passes.
pub fn train(samples: &[Sample], dims: usize, params: SvmParams) -> LinearModel {
    let mut weights = vec![0.0f32; dims];
    let mut bias = 0.0f32;

    if samples.is_empty() {
        return LinearModel { weights, bias };
    }

    let c = params.c;
    let mut alpha = vec![0.0f32; samples.len()];
    let diag: Vec<f32> = samples
        .iter()
        .map(|s| dot(&s.features, &s.features) + 1.0)
        .collect();

    for _ in 0..params.max_epochs.max(1) {
        let mut max_pg = f32::NEG_INFINITY;
        let mut min_pg = f32::INFINITY;

        for (i, sample) in samples.iter().enumerate() {
            let y = sample.label;
            let gradient = y * (dot(&weights, &sample.features) + bias) - 1.0;

            let projected = if alpha[i] <= 0.0 {
                gradient.min(0.0)
            } else if alpha[i] >= c {
                gradient.max(0.0)
            } else {
                gradient
            };

            max_pg = max_pg.max(projected);
            min_pg = min_pg.min(projected);

            if projected.abs() > 1e-12 {
                let old = alpha[i];
                alpha[i] = (old - gradient / diag[i]).clamp(0.0, c);
                let delta = (alpha[i] - old) * y;
                if delta != 0.0 {
                    for (w, x) in weights.iter_mut().zip(&sample.features) {
                        *w += delta * x;
                    }
                    bias += delta;
                }
            }
        }

        if max_pg - min_pg < params.epsilon {
            break;
        }
    }

    LinearModel { weights, bias }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separates_two_clusters() {
        let mut samples = Vec::new();
        for i in 0..20 {
            let jitter = i as f32 * 0.01;
            samples.push(Sample {
                features: vec![1.0 + jitter, 0.1],
                label: 1.0,
            });
            samples.push(Sample {
                features: vec![0.0, 0.2 + jitter],
                label: -1.0,
            });
        }
        let model = train(&samples, 2, SvmParams { c: 10.0, ..Default::default() });
        for sample in &samples {
            assert!(model.decision(&sample.features) * sample.label > 0.0);
        }
    }

    #[test]
    fn zero_vector_negatives_push_bias_down() {
        let samples = vec![
            Sample { features: vec![1.0, 1.0], label: 1.0 },
            Sample { features: vec![0.0, 0.0], label: -1.0 },
        ];
        let model = train(&samples, 2, SvmParams { c: 10.0, ..Default::default() });
        assert!(model.bias < 0.0);
        assert!(model.decision(&[1.0, 1.0]) > 0.0);
    }

    #[test]
    fn no_samples_gives_zero_model() {
        let model = train(&[], 3, SvmParams::default());
        assert_eq!(model.weights, vec![0.0; 3]);
        assert_eq!(model.bias, 0.0);
    }
}
