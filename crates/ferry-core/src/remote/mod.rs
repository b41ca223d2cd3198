//! Abstract remote collaborators: the chunk-addressed object store and the
//! asynchronous conversion service, plus a plain HTTP object store.

mod error;
mod http;
mod traits;
mod types;
mod urn;

pub use error::RemoteError;
pub use http::{HttpObjectStore, HttpStoreOptions};
pub use traits::{ObjectStore, TranslationService};
pub use types::{
    ChunkAck, ChunkUpload, ContainerPolicy, Derivative, DerivativeChild, JobProgress, JobStatus,
    ObjectMeta, ObjectRef,
};
pub use urn::{decode_urn, encode_urn};
