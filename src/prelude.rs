pub use crate::cache::{CacheChange, ListCache, SnapshotCache};
pub use crate::changelog::{ChangeAction, ChangeLog, ChangeLogEntry};
pub use crate::config::StoreConfig;
pub use crate::entity::{Access, Entity, Mission, Named, Placement, Shareable, Task, Timestamp};
pub use crate::error::StoreError;
pub use crate::index::{AssociationIndex, NameIndex, NameLookup, PartitionIndex};
pub use crate::log::{debug, error, info, trace, warn};
pub use crate::operation::{
    AsyncOperation, OperationChain, OperationTracker, PendingResult, Resolver,
};
pub use crate::path::{Query, ResourcePath};
pub use crate::rest::RestClient;
pub use crate::service::{MissionService, Services, TaskService};
pub use crate::store::EntityStore;
pub use crate::sync::CacheSync;
pub use crate::transport::{HttpTransport, MemoryTransport, Transport};
pub use crate::worker::WorkerPool;
