//! 局部坐标系反算

use glam::DVec3;
use rayon::prelude::*;

use super::{default_shape_name, DeltaSpace, InvertedShape};
use crate::config::{get_config, InverterConfig};
use crate::frame::{resolve_frame, LocalFrame};
use crate::mesh::MeshSnapshot;
use crate::Result;

/// 把雕刻位移投影到逐顶点局部坐标系
///
/// 纯函数：同样的输入总是得到同样的输出，调用之间不保留任何状态。
#[derive(Clone, Debug)]
pub struct LocalFrameInverter {
    config: InverterConfig,
}

impl LocalFrameInverter {
    pub fn new(config: InverterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InverterConfig {
        &self.config
    }

    /// 反算 `corrected` 相对 `base` 的位移
    ///
    /// 坐标系建立在 `base` 上。任何顶点失败都不会返回部分结果。
    pub fn invert(&self, base: &MeshSnapshot, corrected: &MeshSnapshot) -> Result<InvertedShape> {
        base.check_compatible(corrected)?;

        let per_vertex = |v: usize| -> Result<(Option<LocalFrame>, DVec3)> {
            let frame = resolve_frame(v, &base.positions, &base.topology, &self.config)?;
            let delta = corrected.positions[v] - base.positions[v];
            let local = frame.map_or(DVec3::ZERO, |f| f.to_local(delta));
            Ok((frame, local))
        };

        let results: Vec<(Option<LocalFrame>, DVec3)> = if self.config.parallel {
            (0..base.vertex_count())
                .into_par_iter()
                .map(per_vertex)
                .collect::<Result<_>>()?
        } else {
            (0..base.vertex_count())
                .map(per_vertex)
                .collect::<Result<_>>()?
        };

        let (frames, deltas): (Vec<_>, Vec<_>) = results.into_iter().unzip();
        let skipped: Vec<usize> = frames
            .iter()
            .enumerate()
            .filter_map(|(v, frame)| frame.is_none().then_some(v))
            .collect();

        if !skipped.is_empty() {
            log::warn!(
                "{} 个顶点的局部坐标系退化，增量已置零: {:?}",
                skipped.len(),
                skipped
            );
        }

        let shape = InvertedShape {
            name: default_shape_name(&corrected.name),
            space: DeltaSpace::Local,
            deltas,
            frames,
            skipped,
        };

        log::debug!(
            "局部坐标系反算完成: base={}, corrected={}, 顶点={}, 非零增量={}",
            base.name,
            corrected.name,
            shape.vertex_count(),
            shape.nonzero_count(),
        );

        Ok(shape)
    }
}

impl Default for LocalFrameInverter {
    fn default() -> Self {
        Self::new(get_config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DegenerateFramePolicy;
    use crate::mesh::{grid, unit_cube, Topology};
    use crate::InverterError;
    use std::sync::Arc;

    fn sequential() -> LocalFrameInverter {
        LocalFrameInverter::new(InverterConfig {
            parallel: false,
            ..InverterConfig::default()
        })
    }

    #[test]
    fn test_identity_gives_zero_deltas() {
        let cube = unit_cube("base");
        let shape = LocalFrameInverter::new(InverterConfig::default())
            .invert(&cube, &cube)
            .unwrap();
        assert_eq!(shape.vertex_count(), 8);
        assert!(shape.deltas.iter().all(|d| *d == DVec3::ZERO));
        assert!(shape.skipped.is_empty());
    }

    #[test]
    fn test_cube_vertex_zero_moved() {
        let base = unit_cube("base");
        let mut positions = base.positions.clone();
        positions[0] += DVec3::new(0.0, 0.1, 0.0);
        let corrected = base.with_positions("sculpt", positions).unwrap();

        let shape = sequential().invert(&base, &corrected).unwrap();
        assert_eq!(shape.name, "sculpt_inverted");
        assert_eq!(shape.space, DeltaSpace::Local);
        assert!((shape.deltas[0].length() - 0.1).abs() < 1e-12);

        // 顶点 0 的坐标系：tangent = +X，所以切线分量为 0
        let s = std::f64::consts::FRAC_1_SQRT_2;
        assert!((shape.deltas[0] - DVec3::new(0.0, -0.1 * s, -0.1 * s)).length() < 1e-12);
        assert!(shape.deltas[1..].iter().all(|d| *d == DVec3::ZERO));
    }

    #[test]
    fn test_reconstruct_reproduces_corrected() {
        let base = grid("base", 3, 3, 0.5);
        let positions: Vec<DVec3> = base
            .positions
            .iter()
            .enumerate()
            .map(|(i, p)| *p + DVec3::new(0.01 * i as f64, -0.02, 0.3 * (i % 3) as f64))
            .collect();
        let corrected = base.with_positions("sculpt", positions).unwrap();

        let shape = sequential().invert(&base, &corrected).unwrap();
        let rebuilt = shape.reconstruct(&base).unwrap();
        for (a, b) in rebuilt.iter().zip(corrected.positions.iter()) {
            assert!((*a - *b).length() < 1e-9);
        }
    }

    #[test]
    fn test_vertex_count_mismatch() {
        let cube = unit_cube("cube");
        let plane = grid("plane", 1, 1, 1.0);
        let err = sequential().invert(&cube, &plane).unwrap_err();
        assert!(matches!(err, InverterError::TopologyMismatch { .. }));
    }

    fn cube_with_isolated_vertex() -> MeshSnapshot {
        let cube = unit_cube("cube");
        let topology = Topology::from_faces(9, cube.topology.faces().to_vec()).unwrap();
        let mut positions = cube.positions.clone();
        positions.push(DVec3::splat(3.0));
        MeshSnapshot::new("cube_plus", positions, Arc::new(topology)).unwrap()
    }

    #[test]
    fn test_isolated_vertex_fails_whole_inversion() {
        let mesh = cube_with_isolated_vertex();
        let err = sequential().invert(&mesh, &mesh).unwrap_err();
        assert_eq!(err, InverterError::DegenerateFrame { vertex: 8 });
    }

    #[test]
    fn test_isolated_vertex_skipped_by_policy() {
        let base = cube_with_isolated_vertex();
        let mut positions = base.positions.clone();
        positions[8] += DVec3::ONE;
        positions[3] += DVec3::Z * 0.2;
        let corrected = base.with_positions("sculpt", positions).unwrap();

        let inverter = LocalFrameInverter::new(InverterConfig {
            degenerate_policy: DegenerateFramePolicy::Skip,
            ..InverterConfig::default()
        });
        let shape = inverter.invert(&base, &corrected).unwrap();
        assert_eq!(shape.skipped, vec![8]);
        assert_eq!(shape.deltas[8], DVec3::ZERO);
        assert!(shape.frames[8].is_none());
        assert!((shape.deltas[3].length() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let base = grid("base", 6, 4, 1.0);
        let positions: Vec<DVec3> = base
            .positions
            .iter()
            .map(|p| *p + DVec3::new(p.y * 0.1, p.x * 0.05, p.x * p.y * 0.01))
            .collect();
        let corrected = base.with_positions("sculpt", positions).unwrap();

        let parallel = LocalFrameInverter::new(InverterConfig::default())
            .invert(&base, &corrected)
            .unwrap();
        let serial = sequential().invert(&base, &corrected).unwrap();
        assert_eq!(parallel.deltas, serial.deltas);
        assert_eq!(parallel.frames, serial.frames);
    }
}
