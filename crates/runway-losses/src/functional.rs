//! Reference losses over plain slices.
//!
//! Both losses reduce by the mean over the batch, matching the defaults of the
//! training framework's built-in criteria.

use crate::error::{LossError, LossResult};
use crate::scores::ScoreMatrix;

/// Lower bound applied to each log term of the binary loss, so a confidently wrong
/// hard prediction costs 100 instead of infinity.
const LOG_FLOOR: f32 = -100.0;

/// Mean multi-class cross-entropy between raw scores and target class indices.
///
/// Scores are normalized with a log-softmax per row.
pub fn cross_entropy(scores: &ScoreMatrix, targets: &[usize]) -> LossResult<f32> {
    if targets.len() != scores.batch_size() {
        return Err(LossError::Shape(format!(
            "{} targets for a batch of {}",
            targets.len(),
            scores.batch_size()
        )));
    }

    let mut total = 0.0_f32;
    for (row, &target) in scores.rows().zip(targets) {
        let score = *row.get(target).ok_or_else(|| {
            LossError::Shape(format!("target class {target} is outside 0..{}", scores.num_classes()))
        })?;
        total += log_sum_exp(row) - score;
    }
    Ok(total / targets.len() as f32)
}

fn log_sum_exp(row: &[f32]) -> f32 {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return max;
    }
    max + row.iter().map(|&s| (s - max).exp()).sum::<f32>().ln()
}

/// Mean binary log-loss between probabilities and targets, both in `[0, 1]`.
pub fn binary_cross_entropy(probs: &[f32], targets: &[f32]) -> LossResult<f32> {
    if probs.len() != targets.len() {
        return Err(LossError::Shape(format!("{} probabilities for {} targets", probs.len(), targets.len())));
    }
    if probs.is_empty() {
        return Err(LossError::Shape("binary loss over an empty batch".to_string()));
    }

    let mut total = 0.0_f32;
    for (i, (&p, &t)) in probs.iter().zip(targets).enumerate() {
        if !(0.0..=1.0).contains(&p) {
            return Err(LossError::InvalidInput(format!("probability {p} at {i} is outside [0, 1]")));
        }
        if !(0.0..=1.0).contains(&t) {
            return Err(LossError::InvalidInput(format!("target {t} at {i} is outside [0, 1]")));
        }
        let log_p = p.ln().max(LOG_FLOOR);
        let log_not_p = (1.0 - p).ln().max(LOG_FLOOR);
        total += -(t * log_p + (1.0 - t) * log_not_p);
    }
    Ok(total / probs.len() as f32)
}

/// Index of the largest score; ties go to the lowest index. `None` for an empty row.
pub fn argmax(row: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &s) in row.iter().enumerate() {
        match best {
            Some((_, b)) if s <= b || s.is_nan() => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_cross_entropy_uniform_scores() {
        let scores = ScoreMatrix::from_rows(&[[0.0_f32, 0.0, 0.0, 0.0]]).unwrap();
        assert!(close(cross_entropy(&scores, &[2]).unwrap(), 4.0_f32.ln()));
    }

    #[test]
    fn test_cross_entropy_is_shift_invariant_and_stable() {
        let a = ScoreMatrix::from_rows(&[[1.0_f32, 2.0, 3.0]]).unwrap();
        let b = ScoreMatrix::from_rows(&[[1001.0_f32, 1002.0, 1003.0]]).unwrap();
        let la = cross_entropy(&a, &[0]).unwrap();
        let lb = cross_entropy(&b, &[0]).unwrap();
        assert!(lb.is_finite());
        assert!(close(la, lb));
    }

    #[test]
    fn test_cross_entropy_rejects_bad_targets() {
        let scores = ScoreMatrix::from_rows(&[[0.5_f32, 0.5]]).unwrap();
        assert!(cross_entropy(&scores, &[2]).is_err());
        assert!(cross_entropy(&scores, &[0, 1]).is_err());
    }

    #[test]
    fn test_binary_cross_entropy_hard_labels() {
        assert_eq!(binary_cross_entropy(&[0.0, 1.0], &[0.0, 1.0]).unwrap(), 0.0);
        // One of two examples confidently wrong: the floored log costs 100, averaged over 2.
        assert!(close(binary_cross_entropy(&[0.0, 1.0], &[1.0, 1.0]).unwrap(), 50.0));
    }

    #[test]
    fn test_binary_cross_entropy_soft_probabilities() {
        let expected = -(0.8_f32.ln() + 0.7_f32.ln()) / 2.0;
        assert!(close(binary_cross_entropy(&[0.8, 0.3], &[1.0, 0.0]).unwrap(), expected));
        assert!(binary_cross_entropy(&[1.5], &[1.0]).is_err());
        assert!(binary_cross_entropy(&[], &[]).is_err());
    }

    #[test]
    fn test_argmax_prefers_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.9, 0.9]), Some(1));
        assert_eq!(argmax(&[-3.0, -1.0, -2.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }
}
