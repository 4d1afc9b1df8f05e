pub mod tick_feed;

pub use tick_feed::TickFeedService;
