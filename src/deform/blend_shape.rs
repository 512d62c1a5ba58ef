//! 变形链前端的修正形状

use glam::DVec3;
use std::sync::Arc;

use super::DeformationMap;
use crate::config::InverterConfig;
use crate::frame::resolve_frame;
use crate::inverter::{DeltaSpace, InvertedShape};
use crate::mesh::Topology;
use crate::{InverterError, Result};

/// 把反算结果作为 BlendShape 目标叠加到静止网格上
///
/// `Rest` 空间的增量直接相加；`Local` 空间的增量需要在静止网格上
/// 重新构建局部坐标系后再还原。
#[derive(Clone)]
pub struct BlendShape {
    shape: Arc<InvertedShape>,
    topology: Arc<Topology>,
    weight: f64,
    config: InverterConfig,
}

impl BlendShape {
    pub fn new(shape: Arc<InvertedShape>, topology: Arc<Topology>, config: InverterConfig) -> Self {
        Self {
            shape,
            topology,
            weight: 1.0,
            config,
        }
    }

    /// 获取权重
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// 设置权重
    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight.clamp(0.0, 1.0);
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.set_weight(weight);
        self
    }

    pub fn shape(&self) -> &InvertedShape {
        &self.shape
    }
}

impl DeformationMap for BlendShape {
    fn deform(&self, rest: &[DVec3]) -> Result<Vec<DVec3>> {
        if rest.len() != self.shape.vertex_count() || rest.len() != self.topology.vertex_count() {
            return Err(InverterError::ChainLength {
                expected: self.shape.vertex_count(),
                actual: rest.len(),
            });
        }

        if self.weight <= 0.0 {
            return Ok(rest.to_vec());
        }

        let weight = self.weight;
        match self.shape.space {
            DeltaSpace::Rest => Ok(rest
                .iter()
                .zip(self.shape.deltas.iter())
                .map(|(&p, &d)| p + d * weight)
                .collect()),
            DeltaSpace::Local => rest
                .iter()
                .enumerate()
                .map(|(v, &p)| -> Result<DVec3> {
                    let local = self.shape.deltas[v];
                    if local == DVec3::ZERO {
                        return Ok(p);
                    }
                    let offset = resolve_frame(v, rest, &self.topology, &self.config)?
                        .map_or(DVec3::ZERO, |frame| frame.to_world(local));
                    Ok(p + offset * weight)
                })
                .collect(),
        }
    }

    fn name(&self) -> &str {
        &self.shape.name
    }
}
