//! Client-side synchronization for Agora message streams: keeps a local,
//! chronologically ordered view of one channel or thread in step with the
//! server by polling (or gateway pushes), and funnels sends and reactions
//! through the server before they appear locally.

pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod refresh;
pub mod transport;

pub use client::{Compose, Snapshot, SyncClient, SyncHandle, SyncState};
pub use config::SyncConfig;
pub use error::{ClientError, Disposition};
pub use transport::{ChatApi, HttpApi, StagedFile};
