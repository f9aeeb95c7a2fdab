//! Data models for resolution sessions

pub mod message;
pub mod request;
pub mod session;

pub use message::BackendMessage;
pub use mfo_common::events::{
    Candidate, EnrichedMetadata, EpisodeOption, MediaKind, SeasonOption, Stage,
};
pub use request::{ActionVariant, ResolveRequest, SeasonEpisode};
pub use session::{
    CandidateSet, SeasonEpisodeContext, SelectionLock, Session, SessionProjection,
    StageTransition,
};
