//! Shape Inverter - 把雕刻好的修正形状反算回变形链前端
//!
//! 给定姿态下的基础网格和美术修正后的网格，计算一个在所有变形之前
//! 叠加的增量，使其经过变形链后重现修正结果：
//! - 逐顶点局部坐标系增量转换（LocalFrameInverter）
//! - 基于变形链雅可比矩阵的反算（ChainInverter）
//! - 线性混合蒙皮 / 刚体变换 / 前置 BlendShape
//! - 宿主适配层与实时重算链接

pub mod config;
pub mod deform;
pub mod frame;
pub mod host;
pub mod inverter;
pub mod live;
pub mod mesh;

pub use config::{get_config, reset_config, set_config, DegenerateFramePolicy, InverterConfig};
pub use deform::{BlendShape, DeformationChain, DeformationMap, LinearBlendSkin, RigidTransform, VertexWeight};
pub use frame::{build_frame, LocalFrame};
pub use host::{
    invert, invert_live, invert_with_config, ChangeCallback, InMemoryHost, MeshRef, MeshSink,
    MeshSnapshotSource, ShapeUpdate,
};
pub use inverter::{invert_snapshots, ChainInverter, DeltaSpace, InvertedShape, LocalFrameInverter};
pub use live::{LiveHandle, LiveLink};
pub use mesh::{grid, unit_cube, MeshSnapshot, Topology};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InverterError {
    #[error("Selection error: expected 2 meshes (base, corrective), got {count}")]
    Selection { count: usize },

    #[error("Topology mismatch between '{base}' and '{corrected}': {detail}")]
    TopologyMismatch {
        base: String,
        corrected: String,
        detail: String,
    },

    #[error("Degenerate local frame at vertex {vertex}")]
    DegenerateFrame { vertex: usize },

    #[error("Upstream deformation error at vertex {vertex}: {reason}")]
    UpstreamDeformation { vertex: usize, reason: String },

    #[error("Singular deformation Jacobian at vertex {vertex}")]
    SingularJacobian { vertex: usize },

    #[error("Deformation chain returned {actual} points, expected {expected}")]
    ChainLength { expected: usize, actual: usize },

    #[error("Face {face} references vertex {index}, mesh has {vertex_count} vertices")]
    InvalidFace {
        face: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Mesh not found: {0}")]
    MeshNotFound(String),

    #[error("Host error: {0}")]
    Host(String),
}

pub type Result<T> = std::result::Result<T, InverterError>;
