//! Built-in response processors

mod meta_tags;
mod server_banner;

pub use meta_tags::{KeywordMatch, MetaTagModule, MetaTagScan, DEFAULT_KEYWORDS};
pub use server_banner::ServerBannerModule;
