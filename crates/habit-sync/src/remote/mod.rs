pub mod memory;
pub mod traits;

pub use memory::MemoryDocumentService;
pub use traits::{RemoteDocumentService, SnapshotCallback, Subscription};
