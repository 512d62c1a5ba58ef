//! 反算配置
//!
//! 参数扁平化，默认值直接写在代码里。每次调用都可以显式传入配置，
//! 全局实例只作为默认来源。

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 退化局部坐标系的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegenerateFramePolicy {
    /// 直接报错，不产生任何结果
    #[default]
    Error,
    /// 按索引顺序尝试其余邻居作为切线锚点，全部失败再报错
    NextNeighbor,
    /// 该顶点增量置零，并记录到 `InvertedShape::skipped`
    Skip,
}

/// 反算配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct InverterConfig {
    // ========== 局部坐标系 ==========
    /// 退化坐标系处理策略，默认 Error
    pub degenerate_policy: DegenerateFramePolicy,
    /// 基向量长度低于此值视为退化，默认 1e-9
    pub frame_epsilon: f64,

    // ========== 雅可比反算 ==========
    /// 求雅可比时对静止网格施加的偏移步长，必须有限且非零，默认 1.0
    pub jacobian_step: f64,
    /// 位移各分量都小于此值时直接跳过，默认 0.001
    pub delta_epsilon: f64,
    /// |det J| 与三列长度乘积之比低于此值视为奇异（与整体缩放无关），默认 1e-9
    pub singular_epsilon: f64,

    // ========== 上游检查 ==========
    /// 是否做尽力而为的上游绝对变形检查，默认 false
    pub validate_chain: bool,
    /// 正负步长雅可比的最大相对差，默认 1e-3
    pub linearity_tolerance: f64,

    // ========== 执行 ==========
    /// 是否用 rayon 并行计算逐顶点数据，默认 true
    pub parallel: bool,
}

impl Default for InverterConfig {
    fn default() -> Self {
        Self {
            degenerate_policy: DegenerateFramePolicy::Error,
            frame_epsilon: 1e-9,

            // 沿 X/Y/Z 各偏移一个单位
            jacobian_step: 1.0,
            // 小于这个量级的雕刻位移当作噪声
            delta_epsilon: 0.001,
            singular_epsilon: 1e-9,

            validate_chain: false,
            linearity_tolerance: 1e-3,

            parallel: true,
        }
    }
}

/// 全局配置实例
static INVERTER_CONFIG: Lazy<RwLock<InverterConfig>> =
    Lazy::new(|| RwLock::new(InverterConfig::default()));

/// 获取当前配置（只读）
pub fn get_config() -> InverterConfig {
    match INVERTER_CONFIG.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// 手动设置配置
pub fn set_config(config: InverterConfig) {
    match INVERTER_CONFIG.write() {
        Ok(mut guard) => *guard = config,
        Err(poisoned) => *poisoned.into_inner() = config,
    }
}

/// 重置为默认配置
pub fn reset_config() {
    set_config(InverterConfig::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InverterConfig::default();
        assert_eq!(config.jacobian_step, 1.0);
        assert_eq!(config.delta_epsilon, 0.001);
        assert_eq!(config.degenerate_policy, DegenerateFramePolicy::Error);
        assert!(!config.validate_chain);
    }
}
