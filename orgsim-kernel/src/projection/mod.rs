/// Projection pipeline.
///
/// Three layers, strictly ordered: structural clustering consumes only
/// the graph; semantic labeling overlays an external classification
/// source; drift detection measures the gap between the two. None of
/// them mutates kernel state.

pub mod classify;
pub mod cluster;
pub mod drift;
pub mod label;
pub mod view;

pub use classify::{ClassificationDb, ClassificationSource, RoleClassification};
pub use cluster::{canonical_cluster_hash, cluster_roles, Cluster};
pub use drift::{compute_drift, DriftEntry, DriftReport};
pub use label::{label_clusters, LabeledCluster, UNCLASSIFIED};
pub use view::{build_view, Department, DepartmentView};
