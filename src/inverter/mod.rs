//! 修正形状反算
//!
//! 两种反算方式：
//! - [`LocalFrameInverter`]：把雕刻位移投影到每个顶点的局部坐标系
//! - [`ChainInverter`]：对变形链求逐顶点雅可比矩阵，把位移映射回静止空间

mod chain;
mod local_frame;

pub use chain::ChainInverter;
pub use local_frame::LocalFrameInverter;

use glam::DVec3;

use crate::config::InverterConfig;
use crate::deform::DeformationMap;
use crate::frame::LocalFrame;
use crate::mesh::MeshSnapshot;
use crate::{InverterError, Result};

/// 增量所在的坐标空间
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeltaSpace {
    /// 每个顶点局部坐标系中的分量 (tangent, bitangent, normal)
    Local,
    /// 静止网格的物体空间
    Rest,
}

/// 反算结果：在变形链最前端叠加的逐顶点增量
#[derive(Clone, Debug)]
pub struct InvertedShape {
    pub name: String,
    pub space: DeltaSpace,
    pub deltas: Vec<DVec3>,
    /// 计算增量时使用的坐标系；`Rest` 空间或被跳过的顶点为 None
    pub frames: Vec<Option<LocalFrame>>,
    /// 按 `Skip` 策略跳过的顶点
    pub skipped: Vec<usize>,
}

impl InvertedShape {
    /// 获取顶点数量
    pub fn vertex_count(&self) -> usize {
        self.deltas.len()
    }

    /// 非零增量的顶点数量
    pub fn nonzero_count(&self) -> usize {
        self.deltas.iter().filter(|d| **d != DVec3::ZERO).count()
    }

    /// 最大增量长度
    pub fn max_delta(&self) -> f64 {
        self.deltas.iter().map(|d| d.length()).fold(0.0, f64::max)
    }

    /// 用计算时的坐标系把增量还原到 `mesh` 上
    ///
    /// `Local` 空间：`mesh + frame · delta`，`mesh` 应为反算时的基础网格；
    /// `Rest` 空间：`mesh + delta`，`mesh` 应为静止网格。
    pub fn reconstruct(&self, mesh: &MeshSnapshot) -> Result<Vec<DVec3>> {
        if mesh.vertex_count() != self.vertex_count() {
            return Err(InverterError::TopologyMismatch {
                base: mesh.name.clone(),
                corrected: self.name.clone(),
                detail: format!(
                    "vertex count {} != {}",
                    mesh.vertex_count(),
                    self.vertex_count()
                ),
            });
        }

        Ok(mesh
            .positions
            .iter()
            .zip(self.world_deltas())
            .map(|(&p, d)| p + d)
            .collect())
    }

    /// 增量在其坐标系对应的世界空间中的向量
    pub fn world_deltas(&self) -> Vec<DVec3> {
        match self.space {
            DeltaSpace::Rest => self.deltas.clone(),
            DeltaSpace::Local => self
                .deltas
                .iter()
                .zip(self.frames.iter())
                .map(|(&d, frame)| frame.map_or(DVec3::ZERO, |f| f.to_world(d)))
                .collect(),
        }
    }
}

/// 根据可用的输入选择反算方式
///
/// 有静止网格和变形链时走雅可比反算，否则走局部坐标系反算。
pub fn invert_snapshots(
    base: &MeshSnapshot,
    corrected: &MeshSnapshot,
    rest: Option<&MeshSnapshot>,
    chain: Option<&dyn DeformationMap>,
    config: &InverterConfig,
) -> Result<InvertedShape> {
    match (rest, chain) {
        (Some(rest), Some(chain)) => {
            ChainInverter::new(config.clone()).invert(rest, base, corrected, chain)
        }
        _ => LocalFrameInverter::new(config.clone()).invert(base, corrected),
    }
}

/// 结果名称：`<corrected>_inverted`
pub fn default_shape_name(corrected: &str) -> String {
    format!("{corrected}_inverted")
}
