//! Runway Losses
//!
//! Loss functions used by the classification pipelines:
//! - A validated class → binary group table (`ClassGroupMap`)
//! - Reference multi-class and binary log-losses over plain score rows
//! - The grouped composite loss that sums both (`GroupedCompositeLoss`)

pub mod composite;
pub mod error;
pub mod functional;
pub mod groups;
pub mod scores;

pub use composite::{GroupedCompositeLoss, LossBreakdown};
pub use error::{LossError, LossResult};
pub use functional::{argmax, binary_cross_entropy, cross_entropy};
pub use groups::{ClassGroupMap, GroupLabel};
pub use scores::ScoreMatrix;
