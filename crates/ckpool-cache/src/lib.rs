//! Redis-backed refreshable caches (coinbase signatures, VarDiff reconnect
//! memory) and the pure VarDiff EMA difficulty calculator consulted
//! alongside them.

pub mod error;
pub mod refreshable;
pub mod signature_cache;
pub mod vardiff;
pub mod vardiff_cache;

pub use error::RedisCacheError;
pub use refreshable::RefreshableCache;
pub use signature_cache::{validate_signature, SignatureCache};
pub use vardiff::{DifficultyAction, VarDiffConfig, VarDiffSession};
pub use vardiff_cache::{VarDiffCache, VarDiffEntry};
