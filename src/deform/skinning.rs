//! 线性混合蒙皮

use glam::{DMat4, DVec3};
use rayon::prelude::*;

use super::{DeformationMap, VertexWeight};
use crate::{InverterError, Result};

/// 线性混合蒙皮变形
#[derive(Clone, Debug)]
pub struct LinearBlendSkin {
    /// 顶点权重
    pub weights: Vec<VertexWeight>,
    /// 骨骼蒙皮矩阵（已乘以逆绑定矩阵）
    pub bone_matrices: Vec<DMat4>,
}

impl LinearBlendSkin {
    pub fn new(weights: Vec<VertexWeight>, bone_matrices: Vec<DMat4>) -> Self {
        Self {
            weights,
            bone_matrices,
        }
    }

    /// 计算单个顶点的蒙皮
    fn skin_vertex(&self, position: DVec3, weight: &VertexWeight) -> DVec3 {
        match weight {
            VertexWeight::Bdef1 { bone } => self.matrix(*bone).transform_point3(position),
            VertexWeight::Bdef2 { bones, weight } => {
                let m0 = self.matrix(bones[0]);
                let m1 = self.matrix(bones[1]);
                let w0 = *weight;
                let w1 = 1.0 - w0;
                m0.transform_point3(position) * w0 + m1.transform_point3(position) * w1
            }
            VertexWeight::Bdef4 { bones, weights } => bones
                .iter()
                .zip(weights.iter())
                .map(|(&bone, &w)| self.matrix(bone).transform_point3(position) * w)
                .sum(),
        }
    }

    fn matrix(&self, index: i32) -> DMat4 {
        if index < 0 {
            return DMat4::IDENTITY;
        }
        self.bone_matrices
            .get(index as usize)
            .copied()
            .unwrap_or(DMat4::IDENTITY)
    }
}

impl DeformationMap for LinearBlendSkin {
    fn deform(&self, rest: &[DVec3]) -> Result<Vec<DVec3>> {
        if rest.len() != self.weights.len() {
            return Err(InverterError::ChainLength {
                expected: self.weights.len(),
                actual: rest.len(),
            });
        }

        Ok(rest
            .par_iter()
            .zip(self.weights.par_iter())
            .map(|(&position, weight)| self.skin_vertex(position, weight))
            .collect())
    }

    fn name(&self) -> &str {
        "linear_blend_skin"
    }
}
