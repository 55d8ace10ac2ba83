//! Artifact download: remote metadata, cache staleness, resumable fetch and
//! verification.
//!
//! ```text
//! CachedArtifact ──needs_download──▶ DownloadDecision
//!        │                                 │ needs_fetch()
//!        │                                 ▼
//!        │                        ResumableFetcher::fetch
//!        ▼                                 │
//! ArtifactVerifier::verify ◀───────────────┘
//! ```

pub mod fetcher;
pub mod metadata;
pub mod staleness;
pub mod verify;

pub use fetcher::{FetchOptions, FetchReport, ResumableFetcher};
pub use metadata::{HttpMetadataResolver, MetadataResolver, RemoteMetadata};
pub use staleness::{CachedArtifact, DownloadDecision, needs_download};
pub use verify::ArtifactVerifier;
