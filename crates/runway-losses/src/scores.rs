use crate::error::{LossError, LossResult};

/// Dense `[batch, num_classes]` prediction scores, row-major.
///
/// Scores are raw (unnormalized) per-class values; nothing here assumes they sum to one.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMatrix {
    data: Vec<f32>,
    num_classes: usize,
}

impl ScoreMatrix {
    pub fn new(data: Vec<f32>, num_classes: usize) -> LossResult<Self> {
        if num_classes == 0 {
            return Err(LossError::Shape("num_classes must be >= 1".to_string()));
        }
        if data.is_empty() {
            return Err(LossError::Shape("score matrix is empty".to_string()));
        }
        if data.len() % num_classes != 0 {
            return Err(LossError::Shape(format!(
                "{} scores do not divide into rows of {num_classes} classes",
                data.len()
            )));
        }
        Ok(Self { data, num_classes })
    }

    pub fn from_rows<R>(rows: &[R]) -> LossResult<Self>
    where
        R: AsRef<[f32]>,
    {
        let num_classes = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * num_classes);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != num_classes {
                return Err(LossError::Shape(format!("row {i} has {} scores, expected {num_classes}", row.len())));
            }
            data.extend_from_slice(row);
        }
        Self::new(data, num_classes)
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.data.len() / self.num_classes
    }

    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.num_classes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_shape() {
        let m = ScoreMatrix::from_rows(&[vec![0.1_f32, 0.2, 0.7], vec![1.0, 0.0, 0.0]]).unwrap();
        assert_eq!(m.batch_size(), 2);
        assert_eq!(m.num_classes(), 3);
        assert_eq!(m.rows().nth(1).unwrap(), &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_rejects_ragged_and_empty() {
        assert!(ScoreMatrix::from_rows(&[vec![0.1_f32, 0.2], vec![0.3]]).is_err());
        assert!(ScoreMatrix::from_rows::<Vec<f32>>(&[]).is_err());
        assert!(ScoreMatrix::new(vec![1.0, 2.0, 3.0], 2).is_err());
    }
}
