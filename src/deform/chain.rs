//! 刚体变换与变形链组合

use glam::{DMat4, DVec3};
use std::sync::Arc;

use super::{check_length, DeformationMap};
use crate::Result;

/// 对所有顶点施加同一个仿射矩阵
#[derive(Clone, Copy, Debug)]
pub struct RigidTransform(pub DMat4);

impl DeformationMap for RigidTransform {
    fn deform(&self, rest: &[DVec3]) -> Result<Vec<DVec3>> {
        Ok(rest.iter().map(|&p| self.0.transform_point3(p)).collect())
    }

    fn name(&self) -> &str {
        "rigid_transform"
    }
}

/// 按顺序执行的变形链
#[derive(Clone, Default)]
pub struct DeformationChain {
    stages: Vec<Arc<dyn DeformationMap>>,
}

impl DeformationChain {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// 追加一个变形阶段
    pub fn then(mut self, stage: Arc<dyn DeformationMap>) -> Self {
        self.stages.push(stage);
        self
    }

    /// 在链的最前端插入一个阶段
    pub fn front_of_chain(mut self, stage: Arc<dyn DeformationMap>) -> Self {
        self.stages.insert(0, stage);
        self
    }

    /// 获取阶段数量
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

impl DeformationMap for DeformationChain {
    fn deform(&self, rest: &[DVec3]) -> Result<Vec<DVec3>> {
        let mut positions = rest.to_vec();
        for stage in &self.stages {
            let output = stage.deform(&positions)?;
            positions = check_length(rest.len(), output)?;
            log::trace!("变形阶段 {} 完成: {} 个顶点", stage.name(), positions.len());
        }
        Ok(positions)
    }

    fn name(&self) -> &str {
        "deformation_chain"
    }
}
