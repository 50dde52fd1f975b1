//! Syndicate - social publishing and campaign scheduling engine
//!
//! Keeps per-platform OAuth credentials valid, publishes content through a
//! uniform adapter interface across seven social networks, and runs the
//! periodic tick that fires due posts and keeps active campaigns stocked
//! with generated content.

pub mod campaigns;
pub mod config;
pub mod content;
pub mod db;
pub mod driver;
pub mod error;
pub mod logging;
pub mod platforms;
pub mod publisher;
pub mod tokens;
pub mod types;
pub mod vault;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use driver::TickRunner;
pub use error::{Result, SyndicateError};
pub use publisher::{PublishReport, Publisher};
pub use types::{
    Campaign, CampaignStatus, Connection, Post, PostStatus, PublishOutcome, SocialPlatform,
    TickSummary,
};
