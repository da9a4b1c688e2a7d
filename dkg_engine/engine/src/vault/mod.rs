//! Share persistence: the storage contract rounds write to and recover from,
//! plus the stores shipped with the engine.

pub mod backend;
pub mod types;

pub use backend::SharePersistence;
pub use backend::memory::MemoryShareStore;
pub use backend::sealed::SealedFileShareStore;
pub use types::{RecordHash, ShareRecord};
