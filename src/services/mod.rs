mod clock;
mod media;

pub use clock::{feed_url, ClockFeed, CLOCK_FEED};
pub use media::{MediaDownloader, StageMedia, MEDIA_DIR};
