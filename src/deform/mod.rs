//! 变形链
//!
//! 宿主的变形链被抽象成一个前向函数：输入静止网格的顶点位置，
//! 输出变形后的顶点位置。反算只需要能在任意输入上求值。

mod blend_shape;
mod chain;
mod skinning;

pub use blend_shape::BlendShape;
pub use chain::{DeformationChain, RigidTransform};
pub use skinning::LinearBlendSkin;

use glam::DVec3;

use crate::{InverterError, Result};

/// 前向变形函数
pub trait DeformationMap: Send + Sync {
    /// 对整组静止位置求值，输出数量必须与输入一致
    fn deform(&self, rest: &[DVec3]) -> Result<Vec<DVec3>>;

    /// 用于日志的名称
    fn name(&self) -> &str {
        "deformation"
    }
}

/// 顶点骨骼权重
#[derive(Clone, Debug, PartialEq)]
pub enum VertexWeight {
    Bdef1 { bone: i32 },
    Bdef2 { bones: [i32; 2], weight: f64 },
    Bdef4 { bones: [i32; 4], weights: [f64; 4] },
}

impl Default for VertexWeight {
    fn default() -> Self {
        VertexWeight::Bdef1 { bone: 0 }
    }
}

/// 检查变形输出数量
pub(crate) fn check_length(expected: usize, output: Vec<DVec3>) -> Result<Vec<DVec3>> {
    if output.len() == expected {
        Ok(output)
    } else {
        Err(InverterError::ChainLength {
            expected,
            actual: output.len(),
        })
    }
}
