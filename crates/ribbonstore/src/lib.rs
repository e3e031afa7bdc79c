//! Persistence for tuned ribbon parameters.
//!
//! Two independent stores: the remotely published subset (everything but the
//! palette) reached through a small JSON RPC surface, and named local
//! snapshots ("profiles") kept as one ordered JSON array.

mod profiles;
mod remote;
mod storage;

pub use profiles::{Profile, ProfileError, ProfileStore, PROFILES_KEY};
pub use remote::{decode_published, ConfigRemote, RemoteError, RpcClient};
pub use storage::{FileStorage, MemoryStorage, ProfileStorage};
