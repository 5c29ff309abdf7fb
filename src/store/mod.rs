mod locks;
mod log_store;
mod rotation;

pub use locks::FeedLocks;
pub use log_store::{LogStore, Watermark};
pub use rotation::{RotationPolicy, RotationRecord};
