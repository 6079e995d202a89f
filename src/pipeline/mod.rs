pub mod bulk;
pub mod deadletter;
pub mod feed;
pub mod handler;

pub use deadletter::DeadletterExporter;
pub use feed::{BackfillFeed, FeedStats};
pub use handler::ChangeBatchHandler;
