//! Upload client for Splice.
//!
//! [`UploadCoordinator`] takes a local file through fingerprinting, the
//! existence check, bounded-parallel transfer of the missing chunks and the
//! final merge. It is generic over [`Transport`]; [`HttpTransport`] talks to a
//! `spliced` server.

pub mod coordinator;
pub mod error;
pub mod fingerprint;
pub mod http;
pub mod source;
pub mod transport;

pub use coordinator::{UploadCoordinator, UploadReport, UploadStatus};
pub use error::{ClientError, ClientResult};
pub use fingerprint::{FingerprintEvent, fingerprint_file, spawn_fingerprint};
pub use http::HttpTransport;
pub use source::ChunkSource;
pub use transport::Transport;
