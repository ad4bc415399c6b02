// Four-layer DAG data model and persistence

pub mod model;
pub mod path_cache;
pub mod storage;

pub use model::{
    DagStage, EdgeData, LayerData, LayerType, NodeData, Position, SharedDag, UnifiedDagModel,
};
pub use path_cache::PathCache;
pub use storage::{DagFileInfo, DagStorage, SavedDag, StorageStats};
