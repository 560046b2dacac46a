//! chunkspace
//!
//! Semantic chunking for long documents plus a durable on-disk workspace
//! that tracks chunked processing sessions with cooperative locking,
//! retry bookkeeping and cleanup.

pub mod boundary;
pub mod chunker;
pub mod config;
pub mod structure;
pub mod tokens;
pub mod workspace;

pub use boundary::{Boundary, BoundaryDetector, BoundaryKind};
pub use chunker::{ChunkStats, ChunkType, Chunker, TextChunk};
pub use config::Config;
pub use structure::DocumentStructure;
pub use tokens::TokenEstimator;
pub use workspace::{
    ChunkRecord, ChunkStatus, FinalSummary, Session, SessionStatus, WorkspaceManager,
};
