//! 网格快照

use glam::DVec3;
use std::sync::Arc;

use super::Topology;
use crate::{InverterError, Result};

/// 从宿主读取的一份只读网格数据
#[derive(Clone, Debug)]
pub struct MeshSnapshot {
    pub name: String,
    pub positions: Vec<DVec3>,
    pub topology: Arc<Topology>,
}

impl MeshSnapshot {
    pub fn new(name: impl Into<String>, positions: Vec<DVec3>, topology: Arc<Topology>) -> Result<Self> {
        let name = name.into();
        if positions.len() != topology.vertex_count() {
            return Err(InverterError::TopologyMismatch {
                base: name.clone(),
                corrected: name,
                detail: format!(
                    "{} positions for a topology of {} vertices",
                    positions.len(),
                    topology.vertex_count()
                ),
            });
        }
        Ok(Self {
            name,
            positions,
            topology,
        })
    }

    /// 共享拓扑、替换顶点位置
    pub fn with_positions(&self, name: impl Into<String>, positions: Vec<DVec3>) -> Result<Self> {
        Self::new(name, positions, Arc::clone(&self.topology))
    }

    /// 获取顶点数量
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// 检查两份快照的顶点数和邻接关系是否一致
    pub fn check_compatible(&self, other: &MeshSnapshot) -> Result<()> {
        let mismatch = |detail: String| InverterError::TopologyMismatch {
            base: self.name.clone(),
            corrected: other.name.clone(),
            detail,
        };

        if self.vertex_count() != other.vertex_count() {
            return Err(mismatch(format!(
                "vertex count {} != {}",
                self.vertex_count(),
                other.vertex_count()
            )));
        }

        if Arc::ptr_eq(&self.topology, &other.topology) {
            return Ok(());
        }

        if !self.topology.same_adjacency(&other.topology) {
            let detail = match self.topology.first_adjacency_difference(&other.topology) {
                Some(vertex) => format!("adjacency differs at vertex {vertex}"),
                None => "adjacency differs".to_string(),
            };
            return Err(mismatch(detail));
        }

        Ok(())
    }
}
