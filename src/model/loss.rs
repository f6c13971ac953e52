use crate::model::LossKind;
use burn::prelude::*;

/// Offset inside the logarithms of the training log-loss
pub const LOG_LOSS_EPSILON: f64 = 1e-7;

/// Mean binary cross-entropy of probabilities against {0, 1} labels.
///
/// `probabilities` and `labels` are both `[batch_size, 1]`.
pub fn log_loss<B: Backend>(probabilities: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1> {
    let positive = labels.clone() * probabilities.clone().add_scalar(LOG_LOSS_EPSILON).log();
    let negative = labels.neg().add_scalar(1.0)
        * probabilities.neg().add_scalar(1.0 + LOG_LOSS_EPSILON).log();

    (positive + negative).neg().mean()
}

/// Half the sum of squared errors
pub fn half_squared_error<B: Backend>(scores: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1> {
    let diff = scores - labels;
    (diff.clone() * diff).sum().div_scalar(2.0)
}

/// Data loss for raw model scores
pub fn data_loss<B: Backend>(kind: LossKind, scores: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1> {
    match kind {
        LossKind::LogLoss => log_loss(burn::tensor::activation::sigmoid(scores), labels),
        LossKind::Mse => half_squared_error(scores, labels),
    }
}

/// Evaluation metrics computed on host vectors
pub mod metrics {
    use crate::error::{Result, WideDeepError};
    use crate::model::MetricKind;

    /// Probability clip used by `log_loss`
    pub const LOG_LOSS_CLIP: f64 = 1e-15;

    fn is_positive(label: f32) -> bool {
        label > 0.5
    }

    fn check_finite(kind: MetricKind, scores: &[f32]) -> Result<()> {
        match scores.iter().position(|s| !s.is_finite()) {
            Some(row) => Err(WideDeepError::Metric {
                metric: kind,
                reason: format!("score {} at row {} is not finite", scores[row], row),
            }),
            None => Ok(()),
        }
    }

    /// Area under the ROC curve, ties sharing their average rank
    pub fn auc(labels: &[f32], scores: &[f32]) -> Result<f64> {
        let positives = labels.iter().filter(|&&y| is_positive(y)).count();
        let negatives = labels.len() - positives;
        if positives == 0 || negatives == 0 {
            return Err(WideDeepError::Metric {
                metric: MetricKind::Auc,
                reason: "labels contain a single class".to_string(),
            });
        }

        check_finite(MetricKind::Auc, scores)?;

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

        let mut ranks = vec![0.0f64; scores.len()];
        let mut start = 0;
        while start < order.len() {
            let mut end = start + 1;
            while end < order.len() && scores[order[end]] == scores[order[start]] {
                end += 1;
            }
            // 1-based ranks start+1..=end share their mean
            let rank = (start + 1 + end) as f64 / 2.0;
            for &idx in &order[start..end] {
                ranks[idx] = rank;
            }
            start = end;
        }

        let positive_rank_sum: f64 = labels
            .iter()
            .zip(&ranks)
            .filter(|(&y, _)| is_positive(y))
            .map(|(_, &r)| r)
            .sum();
        let (p, n) = (positives as f64, negatives as f64);
        Ok((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
    }

    /// Fraction of rows whose score lands on the label's side of 0.5
    pub fn accuracy(labels: &[f32], scores: &[f32]) -> f64 {
        let correct = labels
            .iter()
            .zip(scores)
            .filter(|(&y, &s)| is_positive(y) == (s >= 0.5))
            .count();
        correct as f64 / labels.len() as f64
    }

    /// Mean binary cross-entropy with probabilities clipped away from 0 and 1
    pub fn log_loss(labels: &[f32], scores: &[f32]) -> f64 {
        let total: f64 = labels
            .iter()
            .zip(scores)
            .map(|(&y, &s)| {
                let p = (s as f64).clamp(LOG_LOSS_CLIP, 1.0 - LOG_LOSS_CLIP);
                let y = y as f64;
                -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
            })
            .sum();
        total / labels.len() as f64
    }

    /// Root mean squared error
    pub fn rmse(labels: &[f32], scores: &[f32]) -> f64 {
        let total: f64 = labels
            .iter()
            .zip(scores)
            .map(|(&y, &s)| (y as f64 - s as f64).powi(2))
            .sum();
        (total / labels.len() as f64).sqrt()
    }

    /// Compute `kind` over equally long label and score vectors
    pub fn evaluate(kind: MetricKind, labels: &[f32], scores: &[f32]) -> Result<f64> {
        if labels.len() != scores.len() {
            return Err(WideDeepError::shape("evaluate", "label count", scores.len(), labels.len()));
        }
        if labels.is_empty() {
            return Err(WideDeepError::Metric {
                metric: kind,
                reason: "no rows to evaluate".to_string(),
            });
        }
        check_finite(kind, scores)?;

        match kind {
            MetricKind::Auc => auc(labels, scores),
            MetricKind::Accuracy => Ok(accuracy(labels, scores)),
            MetricKind::LogLoss => Ok(log_loss(labels, scores)),
            MetricKind::Rmse => Ok(rmse(labels, scores)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WideDeepError;
    use crate::model::MetricKind;
    use approx::assert_relative_eq;
    use burn::backend::NdArray;
    use burn::tensor::ElementConversion;

    type TestBackend = NdArray<f32>;

    fn column(values: &[f32]) -> Tensor<TestBackend, 2> {
        let device = Default::default();
        Tensor::<TestBackend, 1>::from_floats(values, &device).reshape([values.len(), 1])
    }

    #[test]
    fn test_log_loss_matches_closed_form() {
        let loss = log_loss(column(&[0.8, 0.3]), column(&[1.0, 0.0]));
        assert_eq!(loss.dims(), [1]);

        let expected = -((0.8f64 + 1e-7).ln() + (1.0f64 - 0.3 + 1e-7).ln()) / 2.0;
        assert_relative_eq!(loss.into_scalar().elem::<f64>(), expected, epsilon = 1e-5);
    }

    #[test]
    fn test_half_squared_error() {
        let loss = data_loss(LossKind::Mse, column(&[1.0, 3.0]), column(&[0.0, 1.0]));
        // (1 + 4) / 2
        assert_relative_eq!(loss.into_scalar().elem::<f64>(), 2.5, epsilon = 1e-6);
    }

    #[test]
    fn test_data_loss_applies_sigmoid_for_logloss() {
        let loss = data_loss(LossKind::LogLoss, column(&[0.0]), column(&[1.0]));
        assert_relative_eq!(loss.into_scalar().elem::<f64>(), 2f64.ln(), epsilon = 1e-5);
    }

    #[test]
    fn test_auc_perfect_separation() {
        let labels = [0.0, 0.0, 1.0, 1.0];
        let scores = [0.1, 0.4, 0.35, 0.8];
        assert_relative_eq!(metrics::auc(&labels, &scores).unwrap(), 0.75);

        let scores = [0.1, 0.2, 0.7, 0.9];
        assert_relative_eq!(metrics::auc(&labels, &scores).unwrap(), 1.0);
    }

    #[test]
    fn test_auc_ties_count_half() {
        let labels = [0.0, 1.0];
        let scores = [0.5, 0.5];
        assert_relative_eq!(metrics::auc(&labels, &scores).unwrap(), 0.5);
    }

    #[test]
    fn test_auc_single_class_is_metric_error() {
        let err = metrics::auc(&[1.0, 1.0], &[0.2, 0.9]).unwrap_err();
        assert!(matches!(err, WideDeepError::Metric { metric: MetricKind::Auc, .. }));
    }

    #[test]
    fn test_rmse_of_exact_predictions_is_zero() {
        let labels = [1.5, -2.0, 0.25];
        assert_eq!(metrics::evaluate(MetricKind::Rmse, &labels, &labels).unwrap(), 0.0);
        assert_relative_eq!(metrics::rmse(&[0.0, 0.0], &[3.0, 4.0]), 12.5f64.sqrt());
    }

    #[test]
    fn test_accuracy_and_log_loss() {
        let labels = [1.0, 0.0, 1.0, 0.0];
        let scores = [0.9, 0.2, 0.4, 0.5];
        assert_relative_eq!(metrics::accuracy(&labels, &scores), 0.5);

        // Clipping keeps a confidently wrong prediction finite
        let ll = metrics::log_loss(&[1.0], &[0.0]);
        assert!(ll.is_finite());
        assert_relative_eq!(ll, -(1e-15f64).ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_evaluate_rejects_non_finite_scores() {
        let labels = [0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0];
        let diverged = [f32::NAN; 8];
        let mixed = [0.1, f32::NAN, 0.3, 0.9, 0.8, 0.2, f32::INFINITY, 0.4];

        for kind in [MetricKind::Auc, MetricKind::Accuracy, MetricKind::LogLoss, MetricKind::Rmse] {
            for scores in [&diverged, &mixed] {
                let err = metrics::evaluate(kind, &labels, scores).unwrap_err();
                assert!(matches!(err, WideDeepError::Metric { metric, .. } if metric == kind));
            }
        }
        assert!(metrics::auc(&labels, &mixed).is_err());
    }

    #[test]
    fn test_evaluate_length_mismatch() {
        let err = metrics::evaluate(MetricKind::Accuracy, &[1.0], &[0.5, 0.5]).unwrap_err();
        assert!(err.is_shape());
    }
}
