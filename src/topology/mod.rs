//! Superpod topology: the in-memory catalog and its reconciliation into external stores

pub mod config_object;
pub mod events;
pub mod file_store;
pub mod model;
pub mod publisher;
pub mod sink;
pub mod store;

pub use config_object::{
    ConfigObjectClient, ConfigObjectSink, DirConfigObjects, InMemoryConfigObjects,
};
pub use events::EventMap;
pub use file_store::FileSink;
pub use model::{Device, NodeDevice, Operator, SuperPodDevice};
pub use publisher::{CycleStats, TopologyPublisher};
pub use sink::{ChecksumGatedStore, PublishLog, ReloadHook, TopologySink};
pub use store::{NodeRegistry, TopologyStore};
