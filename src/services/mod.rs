// Service exports
pub mod cache;
pub mod dict_client;
pub mod lookup;
pub mod mediawiki;

pub use cache::{CacheError, CacheKey, CacheManager, CacheStats};
pub use dict_client::{split_server, DictClient, DictError};
pub use lookup::{accept_languages, LookupOutcome, LookupParams, Listings};
pub use mediawiki::{MediaWikiClient, MediaWikiError};
