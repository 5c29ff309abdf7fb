mod entry;
mod log_line;

pub use entry::{FeedSource, RemoteEntry, RemoteImage};
pub use log_line::LogLine;
