//! 网格数据：拓扑、快照和基础几何体

mod primitives;
mod snapshot;
mod topology;

pub use primitives::{grid, unit_cube};
pub use snapshot::MeshSnapshot;
pub use topology::Topology;
