//! 基于变形链雅可比矩阵的反算
//!
//! 把静止网格的所有顶点同时沿 X / Y / Z 偏移一个步长，各求值一次变形链，
//! 输出相对基础网格的差就是逐顶点雅可比矩阵的三列。雕刻位移乘以 J⁻¹
//! 得到静止空间的增量。

use glam::{DMat3, DVec3};
use rayon::prelude::*;

use super::{default_shape_name, DeltaSpace, InvertedShape};
use crate::config::{get_config, InverterConfig};
use crate::deform::{check_length, DeformationMap};
use crate::mesh::MeshSnapshot;
use crate::{InverterError, Result};

/// 通过变形链的局部线性近似反算修正形状
#[derive(Clone, Debug)]
pub struct ChainInverter {
    config: InverterConfig,
}

impl ChainInverter {
    pub fn new(config: InverterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InverterConfig {
        &self.config
    }

    /// 反算 `corrected` 相对 `base` 的位移
    ///
    /// `rest` 是变形链的输入（未变形网格），`base = chain(rest)`。
    /// 前提：链中没有绝对变形，否则结果无意义。
    pub fn invert(
        &self,
        rest: &MeshSnapshot,
        base: &MeshSnapshot,
        corrected: &MeshSnapshot,
        chain: &dyn DeformationMap,
    ) -> Result<InvertedShape> {
        rest.check_compatible(base)?;
        base.check_compatible(corrected)?;

        let jacobians = self.jacobians(rest, base, chain, self.config.jacobian_step)?;

        if self.config.validate_chain {
            self.validate(rest, base, chain, &jacobians)?;
        }

        let epsilon = self.config.delta_epsilon;
        let singular = self.config.singular_epsilon;
        let per_vertex = |v: usize| -> Result<DVec3> {
            let delta = corrected.positions[v] - base.positions[v];
            if delta.abs().max_element() < epsilon {
                return Ok(DVec3::ZERO);
            }
            let jacobian = jacobians[v];
            if is_singular(&jacobian, singular) {
                return Err(InverterError::SingularJacobian { vertex: v });
            }
            let rest_delta = jacobian.inverse() * delta;
            if !rest_delta.is_finite() {
                return Err(InverterError::SingularJacobian { vertex: v });
            }
            Ok(rest_delta)
        };

        let deltas: Vec<DVec3> = if self.config.parallel {
            (0..base.vertex_count())
                .into_par_iter()
                .map(per_vertex)
                .collect::<Result<_>>()?
        } else {
            (0..base.vertex_count())
                .map(per_vertex)
                .collect::<Result<_>>()?
        };

        let shape = InvertedShape {
            name: default_shape_name(&corrected.name),
            space: DeltaSpace::Rest,
            frames: vec![None; deltas.len()],
            deltas,
            skipped: Vec::new(),
        };

        log::debug!(
            "雅可比反算完成: chain={}, base={}, corrected={}, 非零增量={}/{}",
            chain.name(),
            base.name,
            corrected.name,
            shape.nonzero_count(),
            shape.vertex_count(),
        );

        Ok(shape)
    }

    /// 逐顶点雅可比矩阵，列为静止空间 X / Y / Z 方向的响应
    pub fn jacobians(
        &self,
        rest: &MeshSnapshot,
        base: &MeshSnapshot,
        chain: &dyn DeformationMap,
        step: f64,
    ) -> Result<Vec<DMat3>> {
        if !step.is_finite() || step == 0.0 {
            return Err(InverterError::InvalidConfig(format!(
                "jacobian step must be finite and non-zero, got {step}"
            )));
        }

        let columns = [DVec3::X, DVec3::Y, DVec3::Z]
            .into_iter()
            .map(|axis| -> Result<Vec<DVec3>> {
                let offset: Vec<DVec3> = rest.positions.iter().map(|&p| p + axis * step).collect();
                let deformed = check_length(rest.vertex_count(), chain.deform(&offset)?)?;
                Ok(deformed
                    .iter()
                    .zip(base.positions.iter())
                    .map(|(&moved, &posed)| (moved - posed) / step)
                    .collect())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((0..rest.vertex_count())
            .map(|v| DMat3::from_cols(columns[0][v], columns[1][v], columns[2][v]))
            .collect())
    }

    /// 尽力而为的上游检查
    ///
    /// 正负步长的雅可比应当一致；链对输入完全没有响应或输出非有限值时
    /// 说明上游有绝对变形或链本身有问题。
    fn validate(
        &self,
        rest: &MeshSnapshot,
        base: &MeshSnapshot,
        chain: &dyn DeformationMap,
        jacobians: &[DMat3],
    ) -> Result<()> {
        let backward = self.jacobians(rest, base, chain, -self.config.jacobian_step)?;
        let tolerance = self.config.linearity_tolerance;

        for (v, (forward, backward)) in jacobians.iter().zip(backward.iter()).enumerate() {
            if !forward.is_finite() || !backward.is_finite() {
                return Err(InverterError::UpstreamDeformation {
                    vertex: v,
                    reason: "deformation chain produced non-finite positions".to_string(),
                });
            }

            let scale = frobenius(forward);
            if scale.is_nan() || scale <= 0.0 {
                return Err(InverterError::UpstreamDeformation {
                    vertex: v,
                    reason: "deformation chain does not respond to input offsets".to_string(),
                });
            }

            let difference = frobenius(&(*forward - *backward)) / scale;
            if difference.is_nan() || difference > tolerance {
                return Err(InverterError::UpstreamDeformation {
                    vertex: v,
                    reason: format!(
                        "non-linear response to input offsets (relative difference {difference:.3e})"
                    ),
                });
            }
        }

        log::debug!("上游检查通过: {} 个顶点", jacobians.len());
        Ok(())
    }
}

impl Default for ChainInverter {
    fn default() -> Self {
        Self::new(get_config())
    }
}

/// 按列长度归一化行列式判断奇异；非有限矩阵一律视为奇异
fn is_singular(jacobian: &DMat3, tolerance: f64) -> bool {
    if !jacobian.is_finite() {
        return true;
    }
    let scale = jacobian.x_axis.length() * jacobian.y_axis.length() * jacobian.z_axis.length();
    jacobian.determinant().abs() <= tolerance * scale
}

fn frobenius(m: &DMat3) -> f64 {
    (m.x_axis.length_squared() + m.y_axis.length_squared() + m.z_axis.length_squared()).sqrt()
}
