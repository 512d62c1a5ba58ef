//! 网格拓扑
//!
//! 邻接表从面的边和散边构建，每个顶点的邻居按索引升序、去重，
//! 保证局部坐标系的构建顺序可复现。

use glam::DVec3;
use std::collections::BTreeSet;

use crate::{InverterError, Result};

/// 多边形网格拓扑
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    vertex_count: usize,
    faces: Vec<Vec<u32>>,
    /// 每个顶点的邻居（升序）
    neighbors: Vec<Vec<u32>>,
    /// 每个顶点所在的面
    vertex_faces: Vec<Vec<u32>>,
}

impl Topology {
    /// 从多边形面和不属于任何面的散边构建拓扑
    pub fn new(vertex_count: usize, faces: Vec<Vec<u32>>, loose_edges: &[[u32; 2]]) -> Result<Self> {
        let mut adjacency: Vec<BTreeSet<u32>> = vec![BTreeSet::new(); vertex_count];
        let mut vertex_faces: Vec<Vec<u32>> = vec![Vec::new(); vertex_count];

        for (face_index, face) in faces.iter().enumerate() {
            for &index in face {
                if index as usize >= vertex_count {
                    return Err(InverterError::InvalidFace {
                        face: face_index,
                        index,
                        vertex_count,
                    });
                }
            }

            let n = face.len();
            for i in 0..n {
                let a = face[i];
                let b = face[(i + 1) % n];
                if a != b {
                    adjacency[a as usize].insert(b);
                    adjacency[b as usize].insert(a);
                }
                let owners = &mut vertex_faces[a as usize];
                if owners.last() != Some(&(face_index as u32)) {
                    owners.push(face_index as u32);
                }
            }
        }

        for &[a, b] in loose_edges {
            for index in [a, b] {
                if index as usize >= vertex_count {
                    return Err(InverterError::InvalidFace {
                        face: faces.len(),
                        index,
                        vertex_count,
                    });
                }
            }
            if a != b {
                adjacency[a as usize].insert(b);
                adjacency[b as usize].insert(a);
            }
        }

        let neighbors = adjacency
            .into_iter()
            .map(|set| set.into_iter().collect())
            .collect();

        Ok(Self {
            vertex_count,
            faces,
            neighbors,
            vertex_faces,
        })
    }

    /// 只有面的拓扑
    pub fn from_faces(vertex_count: usize, faces: Vec<Vec<u32>>) -> Result<Self> {
        Self::new(vertex_count, faces, &[])
    }

    /// 获取顶点数量
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// 获取面数量
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn faces(&self) -> &[Vec<u32>] {
        &self.faces
    }

    /// 顶点的邻居（升序）
    pub fn neighbors(&self, vertex: usize) -> &[u32] {
        self.neighbors.get(vertex).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 顶点所在的面索引
    pub fn faces_of(&self, vertex: usize) -> &[u32] {
        self.vertex_faces.get(vertex).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 邻接关系是否一致（顶点数和每个顶点的邻居都相同）
    pub fn same_adjacency(&self, other: &Topology) -> bool {
        self.vertex_count == other.vertex_count && self.neighbors == other.neighbors
    }

    /// 第一个邻接关系不同的顶点
    pub fn first_adjacency_difference(&self, other: &Topology) -> Option<usize> {
        self.neighbors
            .iter()
            .zip(other.neighbors.iter())
            .position(|(a, b)| a != b)
    }

    /// 面积加权的面法线（Newell 方法，长度 = 2 × 面积）
    pub fn face_area_vector(&self, face: usize, positions: &[DVec3]) -> DVec3 {
        let Some(indices) = self.faces.get(face) else {
            return DVec3::ZERO;
        };
        let n = indices.len();
        if n < 3 {
            return DVec3::ZERO;
        }

        // 顶点缺失时按零面积处理
        let corner = |i: usize| positions.get(indices[i] as usize).copied();
        let Some(origin) = corner(0) else {
            return DVec3::ZERO;
        };
        let mut sum = DVec3::ZERO;
        for i in 1..n - 1 {
            let (Some(b), Some(c)) = (corner(i), corner(i + 1)) else {
                return DVec3::ZERO;
            };
            sum += (b - origin).cross(c - origin);
        }
        sum
    }

    /// 顶点处面积加权的法线累加值（未归一化）
    pub fn vertex_area_normal(&self, vertex: usize, positions: &[DVec3]) -> DVec3 {
        self.faces_of(vertex)
            .iter()
            .map(|&face| self.face_area_vector(face as usize, positions))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_with_tail() -> Topology {
        // 0-1-2-3 四边形，4 只通过散边连到 3，5 孤立
        Topology::new(6, vec![vec![0, 1, 2, 3]], &[[3, 4]]).unwrap()
    }

    #[test]
    fn test_neighbors_sorted_and_deduplicated() {
        let topo = Topology::from_faces(4, vec![vec![0, 1, 2], vec![0, 2, 3]]).unwrap();
        assert_eq!(topo.neighbors(0), &[1, 2, 3]);
        assert_eq!(topo.neighbors(2), &[0, 1, 3]);
        assert_eq!(topo.neighbors(1), &[0, 2]);
    }

    #[test]
    fn test_loose_edges_and_isolated_vertex() {
        let topo = quad_with_tail();
        assert_eq!(topo.neighbors(3), &[0, 2, 4]);
        assert_eq!(topo.neighbors(4), &[3]);
        assert!(topo.neighbors(5).is_empty());
        assert!(topo.faces_of(4).is_empty());
        assert_eq!(topo.faces_of(0), &[0]);
    }

    #[test]
    fn test_out_of_range_face_rejected() {
        let err = Topology::from_faces(3, vec![vec![0, 1, 7]]).unwrap_err();
        assert_eq!(
            err,
            InverterError::InvalidFace {
                face: 0,
                index: 7,
                vertex_count: 3
            }
        );
    }

    #[test]
    fn test_face_area_vector() {
        let topo = Topology::from_faces(4, vec![vec![0, 1, 2, 3]]).unwrap();
        let positions = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(2.0, 0.0, 0.0),
            DVec3::new(2.0, 1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        ];
        let area = topo.face_area_vector(0, &positions);
        assert!((area - DVec3::new(0.0, 0.0, 4.0)).length() < 1e-12);
    }

    #[test]
    fn test_adjacency_comparison() {
        let a = Topology::from_faces(4, vec![vec![0, 1, 2], vec![0, 2, 3]]).unwrap();
        let b = Topology::from_faces(4, vec![vec![0, 1, 3], vec![1, 2, 3]]).unwrap();
        assert!(a.same_adjacency(&a.clone()));
        assert!(!a.same_adjacency(&b));
        assert_eq!(a.first_adjacency_difference(&b), Some(0));
    }

    #[test]
    fn test_short_positions_give_zero_area() {
        let topo = Topology::from_faces(4, vec![vec![0, 1, 2, 3]]).unwrap();
        let positions = [DVec3::ZERO, DVec3::X];
        assert_eq!(topo.face_area_vector(0, &positions), DVec3::ZERO);
        assert_eq!(topo.vertex_area_normal(0, &positions), DVec3::ZERO);
    }
}
