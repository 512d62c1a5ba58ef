//! 局部坐标系构建

use glam::DVec3;

use super::LocalFrame;
use crate::config::{DegenerateFramePolicy, InverterConfig};
use crate::mesh::Topology;
use crate::{InverterError, Result};

/// 以指定邻居为切线锚点构建坐标系，退化时返回 None
pub fn build_frame_with_anchor(
    vertex: usize,
    anchor: u32,
    positions: &[DVec3],
    topology: &Topology,
    epsilon: f64,
) -> Option<LocalFrame> {
    if positions.len() != topology.vertex_count() {
        return None;
    }
    let origin = *positions.get(vertex)?;
    let edge = *positions.get(anchor as usize)? - origin;
    let edge_length = edge.length();
    if edge_length <= epsilon {
        return None;
    }
    let tangent = edge / edge_length;

    // 面法线优先，去掉沿切线的分量
    let area_normal = topology.vertex_area_normal(vertex, positions);
    let mut normal = area_normal - tangent * area_normal.dot(tangent);

    // 不在任何有效面上：用切线和下一条边的叉积
    if normal.length() <= epsilon {
        normal = topology
            .neighbors(vertex)
            .iter()
            .filter(|&&n| n != anchor)
            .filter_map(|&n| positions.get(n as usize))
            .map(|&p| tangent.cross(p - origin))
            .find(|candidate| candidate.length() > epsilon)?;
    }

    let normal = normal.normalize();
    let bitangent = normal.cross(tangent);

    Some(LocalFrame {
        tangent,
        bitangent,
        normal,
    })
}

/// 用索引最小的邻居构建坐标系
pub fn build_frame(
    vertex: usize,
    positions: &[DVec3],
    topology: &Topology,
    epsilon: f64,
) -> Result<LocalFrame> {
    topology
        .neighbors(vertex)
        .first()
        .and_then(|&anchor| build_frame_with_anchor(vertex, anchor, positions, topology, epsilon))
        .ok_or(InverterError::DegenerateFrame { vertex })
}

/// 按配置的退化策略构建坐标系
///
/// 返回 `Ok(None)` 表示该顶点按 `Skip` 策略被跳过。
pub fn resolve_frame(
    vertex: usize,
    positions: &[DVec3],
    topology: &Topology,
    config: &InverterConfig,
) -> Result<Option<LocalFrame>> {
    match config.degenerate_policy {
        DegenerateFramePolicy::Error => {
            build_frame(vertex, positions, topology, config.frame_epsilon).map(Some)
        }
        DegenerateFramePolicy::NextNeighbor => topology
            .neighbors(vertex)
            .iter()
            .find_map(|&anchor| {
                build_frame_with_anchor(vertex, anchor, positions, topology, config.frame_epsilon)
            })
            .map(Some)
            .ok_or(InverterError::DegenerateFrame { vertex }),
        DegenerateFramePolicy::Skip => {
            match build_frame(vertex, positions, topology, config.frame_epsilon) {
                Ok(frame) => Ok(Some(frame)),
                Err(InverterError::DegenerateFrame { .. }) => Ok(None),
                Err(e) => Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{grid, unit_cube};

    const EPS: f64 = 1e-9;

    #[test]
    fn test_cube_corner_frame() {
        let cube = unit_cube("cube");
        let frame = build_frame(0, &cube.positions, &cube.topology, EPS).unwrap();
        let s = std::f64::consts::FRAC_1_SQRT_2;

        assert!((frame.tangent - DVec3::X).length() < 1e-12);
        assert!((frame.normal - DVec3::new(0.0, -s, -s)).length() < 1e-12);
        assert!((frame.bitangent - DVec3::new(0.0, -s, s)).length() < 1e-12);
        assert!(frame.is_orthonormal(1e-12));
    }

    #[test]
    fn test_frames_are_right_handed() {
        let cube = unit_cube("cube");
        for v in 0..cube.vertex_count() {
            let frame = build_frame(v, &cube.positions, &cube.topology, EPS).unwrap();
            assert!((frame.tangent.cross(frame.bitangent) - frame.normal).length() < 1e-12);
        }
    }

    #[test]
    fn test_flat_grid_normal_is_face_normal() {
        let plane = grid("plane", 2, 2, 1.0);
        for v in 0..plane.vertex_count() {
            let frame = build_frame(v, &plane.positions, &plane.topology, EPS).unwrap();
            assert!((frame.normal - DVec3::Z).length() < 1e-12);
        }
    }

    #[test]
    fn test_isolated_vertex_is_degenerate() {
        let topology = Topology::from_faces(4, vec![vec![0, 1, 2]]).unwrap();
        let positions = [DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::splat(5.0)];
        let err = build_frame(3, &positions, &topology, EPS).unwrap_err();
        assert_eq!(err, InverterError::DegenerateFrame { vertex: 3 });
    }

    #[test]
    fn test_wire_vertex_uses_second_edge() {
        // 1 只通过散边连接 0 和 2，不在任何面上
        let topology = Topology::new(3, Vec::new(), &[[0, 1], [1, 2]]).unwrap();
        let positions = [DVec3::ZERO, DVec3::X, DVec3::new(1.0, 1.0, 0.0)];
        let frame = build_frame(1, &positions, &topology, EPS).unwrap();
        assert!((frame.tangent + DVec3::X).length() < 1e-12);
        assert!(frame.is_orthonormal(1e-12));
    }

    #[test]
    fn test_collinear_wire_is_degenerate() {
        let topology = Topology::new(3, Vec::new(), &[[0, 1], [1, 2]]).unwrap();
        let positions = [DVec3::ZERO, DVec3::X, DVec3::new(2.0, 0.0, 0.0)];
        assert!(build_frame(1, &positions, &topology, EPS).is_err());
    }

    #[test]
    fn test_next_neighbor_policy_skips_coincident_anchor() {
        // 顶点 1 与锚点 0 重合
        let topology = Topology::from_faces(4, vec![vec![0, 1, 2], vec![1, 3, 2]]).unwrap();
        let positions = [DVec3::X, DVec3::X, DVec3::new(1.0, 1.0, 0.0), DVec3::new(2.0, 0.0, 0.0)];

        let strict = InverterConfig::default();
        assert!(resolve_frame(1, &positions, &topology, &strict).is_err());

        let lenient = InverterConfig {
            degenerate_policy: DegenerateFramePolicy::NextNeighbor,
            ..InverterConfig::default()
        };
        let frame = resolve_frame(1, &positions, &topology, &lenient).unwrap().unwrap();
        assert!((frame.tangent - DVec3::Y).length() < 1e-12);
        assert!(frame.is_orthonormal(1e-9));
    }

    #[test]
    fn test_skip_policy_returns_none() {
        let topology = Topology::from_faces(4, vec![vec![0, 1, 2]]).unwrap();
        let positions = [DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::splat(5.0)];
        let config = InverterConfig {
            degenerate_policy: DegenerateFramePolicy::Skip,
            ..InverterConfig::default()
        };
        assert_eq!(resolve_frame(3, &positions, &topology, &config).unwrap(), None);
        assert!(resolve_frame(0, &positions, &topology, &config).unwrap().is_some());
    }

    #[test]
    fn test_short_positions_are_degenerate() {
        let cube = unit_cube("cube");
        let short = &cube.positions[..3];
        assert!(build_frame_with_anchor(0, 1, short, &cube.topology, EPS).is_none());
        assert_eq!(
            build_frame(0, short, &cube.topology, EPS).unwrap_err(),
            InverterError::DegenerateFrame { vertex: 0 }
        );
    }
}
