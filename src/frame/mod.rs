//! 逐顶点局部坐标系
//!
//! 切线指向索引最小的邻居，法线取顶点处面积加权的面法线并与切线正交化，
//! 副切线 = 法线 × 切线。三个基向量构成右手正交基。

mod builder;

pub use builder::{build_frame, build_frame_with_anchor, resolve_frame};

use glam::{DMat3, DVec3};

/// 顶点处的正交基（切线、副切线、法线）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalFrame {
    pub tangent: DVec3,
    pub bitangent: DVec3,
    pub normal: DVec3,
}

impl LocalFrame {
    /// 列为 (tangent, bitangent, normal) 的矩阵
    pub fn matrix(&self) -> DMat3 {
        DMat3::from_cols(self.tangent, self.bitangent, self.normal)
    }

    /// 世界空间向量投影到局部坐标（frameᵀ · d）
    pub fn to_local(&self, world: DVec3) -> DVec3 {
        DVec3::new(
            self.tangent.dot(world),
            self.bitangent.dot(world),
            self.normal.dot(world),
        )
    }

    /// 局部坐标还原到世界空间（frame · l）
    pub fn to_world(&self, local: DVec3) -> DVec3 {
        self.tangent * local.x + self.bitangent * local.y + self.normal * local.z
    }

    /// 基向量两两正交且为单位长度
    pub fn is_orthonormal(&self, tolerance: f64) -> bool {
        let unit = |v: DVec3| (v.length() - 1.0).abs() <= tolerance;
        unit(self.tangent)
            && unit(self.bitangent)
            && unit(self.normal)
            && self.tangent.dot(self.bitangent).abs() <= tolerance
            && self.tangent.dot(self.normal).abs() <= tolerance
            && self.bitangent.dot(self.normal).abs() <= tolerance
    }
}
