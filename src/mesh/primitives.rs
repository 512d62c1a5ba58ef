//! 基础几何体

use glam::DVec3;
use std::sync::Arc;

use super::{MeshSnapshot, Topology};

/// [0, 1]³ 单位立方体，8 个顶点，6 个朝外的四边形
///
/// 顶点 i 的坐标由二进制位决定：x = bit0, y = bit1, z = bit2。
pub fn unit_cube(name: impl Into<String>) -> MeshSnapshot {
    let positions = (0..8u32)
        .map(|i| {
            DVec3::new(
                f64::from(i & 1),
                f64::from((i >> 1) & 1),
                f64::from((i >> 2) & 1),
            )
        })
        .collect();

    let faces = vec![
        vec![0, 2, 3, 1], // -Z
        vec![4, 5, 7, 6], // +Z
        vec![0, 1, 5, 4], // -Y
        vec![2, 6, 7, 3], // +Y
        vec![0, 4, 6, 2], // -X
        vec![1, 3, 7, 5], // +X
    ];

    build(name, positions, faces)
}

/// XY 平面上的规则网格，(columns + 1) × (rows + 1) 个顶点
///
/// 顶点按行优先排列，索引 = row * (columns + 1) + column。
pub fn grid(name: impl Into<String>, columns: u32, rows: u32, spacing: f64) -> MeshSnapshot {
    let stride = columns + 1;
    let mut positions = Vec::with_capacity(((rows + 1) * stride) as usize);
    for row in 0..=rows {
        for column in 0..=columns {
            positions.push(DVec3::new(
                f64::from(column) * spacing,
                f64::from(row) * spacing,
                0.0,
            ));
        }
    }

    let mut faces = Vec::with_capacity((rows * columns) as usize);
    for row in 0..rows {
        for column in 0..columns {
            let a = row * stride + column;
            faces.push(vec![a, a + 1, a + 1 + stride, a + stride]);
        }
    }

    build(name, positions, faces)
}

fn build(name: impl Into<String>, positions: Vec<DVec3>, faces: Vec<Vec<u32>>) -> MeshSnapshot {
    let topology = Topology::from_faces(positions.len(), faces)
        .map(Arc::new)
        .unwrap_or_else(|_| unreachable!("primitive faces are in range"));
    MeshSnapshot {
        name: name.into(),
        positions,
        topology,
    }
}
