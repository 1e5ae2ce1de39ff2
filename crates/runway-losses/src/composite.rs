use crate::error::{LossError, LossResult};
use crate::functional::{argmax, binary_cross_entropy, cross_entropy};
use crate::groups::ClassGroupMap;
use crate::scores::ScoreMatrix;
use serde::{Deserialize, Serialize};

/// The two terms of a composite loss and their sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossBreakdown {
    pub class_loss: f32,
    pub group_loss: f32,
    pub total: f32,
}

/// Multi-class cross-entropy plus a binary loss over coarse groups.
///
/// The group term compares the group of the arg-max class against the group of the
/// target class. Predicted groups are hard 0/1 values, so the term is 0 when every
/// example lands in the right group and 100 per misgrouped example (averaged) otherwise.
/// Arg-max is not differentiable: only the class term carries gradient.
#[derive(Debug, Clone)]
pub struct GroupedCompositeLoss {
    groups: ClassGroupMap,
}

impl GroupedCompositeLoss {
    #[must_use]
    pub fn new(groups: ClassGroupMap) -> Self {
        Self { groups }
    }

    #[must_use]
    pub fn groups(&self) -> &ClassGroupMap {
        &self.groups
    }

    pub fn forward(&self, scores: &ScoreMatrix, targets: &[usize]) -> LossResult<LossBreakdown> {
        let class_loss = cross_entropy(scores, targets)?;

        let mut predicted_groups = Vec::with_capacity(targets.len());
        let mut target_groups = Vec::with_capacity(targets.len());
        for (row, &target) in scores.rows().zip(targets) {
            let predicted = argmax(row).ok_or_else(|| LossError::Shape("empty score row".to_string()))?;
            predicted_groups.push(self.groups.group_of(predicted)?.as_f32());
            target_groups.push(self.groups.group_of(target)?.as_f32());
        }

        let group_loss = binary_cross_entropy(&predicted_groups, &target_groups)?;
        tracing::trace!(class_loss, group_loss, "composite loss");

        Ok(LossBreakdown { class_loss, group_loss, total: class_loss + group_loss })
    }

    pub fn compute(&self, scores: &ScoreMatrix, targets: &[usize]) -> LossResult<f32> {
        Ok(self.forward(scores, targets)?.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::GroupLabel;

    fn three_class_loss() -> GroupedCompositeLoss {
        use GroupLabel::{One, Zero};
        GroupedCompositeLoss::new(ClassGroupMap::new([(0, Zero), (1, Zero), (2, One)], 3).unwrap())
    }

    #[test]
    fn test_matching_groups_add_nothing() {
        let loss = three_class_loss();
        let scores = ScoreMatrix::from_rows(&[[0.9_f32, 0.05, 0.05], [0.1, 0.1, 0.8]]).unwrap();

        let out = loss.forward(&scores, &[0, 2]).unwrap();

        assert_eq!(out.group_loss, 0.0);
        assert_eq!(out.total, cross_entropy(&scores, &[0, 2]).unwrap());
        assert_eq!(out.total, out.class_loss);
    }

    #[test]
    fn test_same_group_confusion_is_not_penalized_twice() {
        let loss = three_class_loss();
        // Predicts class 1 for a class-0 target: wrong class, right group.
        let scores = ScoreMatrix::from_rows(&[[0.1_f32, 0.8, 0.1]]).unwrap();

        let out = loss.forward(&scores, &[0]).unwrap();
        assert_eq!(out.group_loss, 0.0);
        assert!(out.class_loss > 0.0);
    }

    #[test]
    fn test_wrong_group_adds_floored_penalty() {
        let loss = three_class_loss();
        let scores = ScoreMatrix::from_rows(&[[0.1_f32, 0.1, 0.8], [0.9, 0.05, 0.05]]).unwrap();

        let out = loss.forward(&scores, &[0, 0]).unwrap();
        assert!((out.group_loss - 50.0).abs() < 1e-4);
        assert_eq!(out.total, out.class_loss + out.group_loss);
        assert_eq!(loss.compute(&scores, &[0, 0]).unwrap(), out.total);
    }

    #[test]
    fn test_unmapped_target_fails_lookup() {
        use GroupLabel::Zero;
        let loss = GroupedCompositeLoss::new(ClassGroupMap::new([(0, Zero), (1, Zero)], 2).unwrap());
        let scores = ScoreMatrix::from_rows(&[[0.9_f32, 0.05, 0.05]]).unwrap();

        let err = loss.forward(&scores, &[2]).unwrap_err();
        assert!(matches!(err, LossError::UnmappedClass(2)), "got {err:?}");
    }

    #[test]
    fn test_unmapped_prediction_fails_lookup() {
        use GroupLabel::Zero;
        let loss = GroupedCompositeLoss::new(ClassGroupMap::new([(0, Zero), (1, Zero)], 2).unwrap());
        let scores = ScoreMatrix::from_rows(&[[0.0_f32, 0.1, 5.0]]).unwrap();

        let err = loss.forward(&scores, &[0]).unwrap_err();
        assert!(matches!(err, LossError::UnmappedClass(2)), "got {err:?}");
    }

    #[test]
    fn test_binary_digits_table_end_to_end() {
        let loss = GroupedCompositeLoss::new(ClassGroupMap::binary_digits());
        let mut row = [0.0_f32; 10];
        row[8] = 4.0;

        // Class 8 and class 9 share group 0.
        let out = loss.forward(&ScoreMatrix::from_rows(&[row]).unwrap(), &[9]).unwrap();
        assert_eq!(out.group_loss, 0.0);
    }
}
