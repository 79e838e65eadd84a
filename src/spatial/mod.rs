pub mod clustering;
pub mod hot;
pub mod index;

pub use clustering::{
    ClusterCache, ClusterId, ClusterInput, ClusterInstance, ClusterKey, ClusterRef, ClusterSnapshot,
    ClusteringEngine, GridClusterConfig, GridClusterer, VoClusters,
};
pub use hot::{HotItem, HotItemTracker, HotReference, HotResolution};
pub use index::{SpatialIndex, SpatialItem};
