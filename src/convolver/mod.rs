pub mod block;
pub mod three_stage;

pub use block::BlockConvolver;
pub use three_stage::{DoubleBuffer, ThreeStageConvolver};
