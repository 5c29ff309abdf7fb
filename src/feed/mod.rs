mod fetcher;
mod renderer;
mod sync;

pub use fetcher::{FeedFetcher, FetchFeed};
pub use renderer::EntryRenderer;
pub use sync::{FeedSyncer, SyncReport};
