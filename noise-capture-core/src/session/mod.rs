pub mod fast_lane;
pub(crate) mod lane;
pub mod queue;
pub(crate) mod shared;
pub mod standard_lane;
pub mod supervisor;
