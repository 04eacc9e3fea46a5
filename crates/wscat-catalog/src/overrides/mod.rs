//! Price/stock override feed: parsing and the in-memory cache the query
//! service reads on every request.

mod cache;
pub mod feed;

pub use cache::{OverrideCache, OverrideGeneration, OverrideStatus, RefreshOutcome};
pub use feed::{
    parse_feed, parse_feed_file, FeedLayout, FeedParser, FeedRow, FeedStats, NamedColumnParser,
    ParsedFeed, PositionalColumnParser,
};
