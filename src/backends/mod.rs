//! Tier implementations composed by the coordinator (C4).

pub mod local;
pub mod remote;
pub mod traits;

pub use local::LocalTier;
pub use remote::NullRemoteTier;
#[cfg(feature = "redis")]
pub use remote::RedisRemoteTier;
pub use traits::{LocalBackend, RemoteBackend};
