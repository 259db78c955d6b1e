// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    DatabaseEntry, DefineResult, Definition, DisplayFormat, ErrorReply, InfoResult, LookupKind,
    LookupRecord, LookupResult, MatchGroup, MatchResult, StrategyEntry,
};
pub use requests::{IndexQuery, LookupRequest};
pub use responses::{ErrorResponse, HealthResponse, LookupResponse};
