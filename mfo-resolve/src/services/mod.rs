//! External service clients

pub mod backend_client;
pub mod tmdb_client;

pub use backend_client::{BackendChannel, ByteStream, HttpBackendClient};
pub use tmdb_client::{ItemDetails, MetadataLookup, NullMetadata, TmdbClient};
