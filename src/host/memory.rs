//! 内存中的宿主实现
//!
//! 按名称保存网格、静止网格和变形链，写回的反算形状同样登记为网格，
//! 名称冲突时追加数字后缀。修改网格顶点时同步调用该网格上注册的变更回调。

use glam::DVec3;
use std::collections::HashMap;
use std::sync::Arc;

use super::{ChangeCallback, MeshRef, MeshSink, MeshSnapshotSource, ShapeUpdate};
use crate::deform::DeformationMap;
use crate::inverter::InvertedShape;
use crate::mesh::MeshSnapshot;
use crate::{InverterError, Result};

/// 内存宿主
#[derive(Default)]
pub struct InMemoryHost {
    meshes: HashMap<MeshRef, MeshSnapshot>,
    rest_meshes: HashMap<MeshRef, MeshSnapshot>,
    chains: HashMap<MeshRef, Arc<dyn DeformationMap>>,
    shapes: HashMap<MeshRef, Arc<InvertedShape>>,
    selection: Vec<MeshRef>,
    listeners: HashMap<MeshRef, Vec<ChangeCallback>>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个没有变形链的网格
    pub fn insert_mesh(&mut self, mesh: MeshSnapshot) -> MeshRef {
        let mesh_ref = MeshRef::new(mesh.name.clone());
        self.meshes.insert(mesh_ref.clone(), mesh);
        mesh_ref
    }

    /// 注册一个带变形链的网格，姿态由链对静止网格求值得到
    pub fn insert_deformed(
        &mut self,
        name: impl Into<String>,
        rest: MeshSnapshot,
        chain: Arc<dyn DeformationMap>,
    ) -> Result<MeshRef> {
        let name = name.into();
        let posed = rest.with_positions(name.clone(), chain.deform(&rest.positions)?)?;
        let mesh_ref = MeshRef::new(name);
        self.meshes.insert(mesh_ref.clone(), posed);
        self.rest_meshes.insert(mesh_ref.clone(), rest);
        self.chains.insert(mesh_ref.clone(), chain);
        Ok(mesh_ref)
    }

    /// 替换网格的顶点位置（模拟美术继续雕刻），并通知该网格的监听者
    pub fn set_positions(&mut self, mesh: &MeshRef, positions: Vec<DVec3>) -> Result<()> {
        let current = self
            .meshes
            .get(mesh)
            .ok_or_else(|| InverterError::MeshNotFound(mesh.to_string()))?;
        let updated = current.with_positions(current.name.clone(), positions)?;
        self.meshes.insert(mesh.clone(), updated.clone());
        self.notify_changed(mesh, &updated)
    }

    /// 网格上注册的监听者数量
    pub fn listener_count(&self, mesh: &MeshRef) -> usize {
        self.listeners.get(mesh).map_or(0, Vec::len)
    }

    fn notify_changed(&mut self, mesh: &MeshRef, snapshot: &MeshSnapshot) -> Result<()> {
        let updates: Vec<ShapeUpdate> = match self.listeners.get(mesh) {
            Some(listeners) => listeners.iter().filter_map(|callback| callback(snapshot)).collect(),
            None => return Ok(()),
        };
        // 更新反算网格不再触发其监听者
        for update in updates {
            self.apply_update(update)?;
        }
        Ok(())
    }

    fn apply_update(&mut self, update: ShapeUpdate) -> Result<()> {
        let current = self
            .meshes
            .get(&update.target)
            .ok_or_else(|| InverterError::MeshNotFound(update.target.to_string()))?;
        let mesh = current.with_positions(current.name.clone(), update.positions)?;
        log::debug!("实时更新反算网格 {}", update.target);
        self.meshes.insert(update.target.clone(), mesh);
        self.shapes.insert(update.target, update.shape);
        Ok(())
    }

    /// 设置当前选择
    pub fn select(&mut self, selection: Vec<MeshRef>) {
        self.selection = selection;
    }

    /// 获取网格
    pub fn mesh(&self, mesh: &MeshRef) -> Option<&MeshSnapshot> {
        self.meshes.get(mesh)
    }

    /// 获取写回的反算形状
    pub fn shape(&self, mesh: &MeshRef) -> Option<Arc<InvertedShape>> {
        self.shapes.get(mesh).cloned()
    }

    /// 获取网格数量
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    fn unique_name(&self, name: &str) -> MeshRef {
        let candidate = MeshRef::new(name);
        if !self.meshes.contains_key(&candidate) {
            return candidate;
        }
        (1..)
            .map(|i| MeshRef::new(format!("{name}{i}")))
            .find(|r| !self.meshes.contains_key(r))
            .unwrap_or(candidate)
    }
}

impl MeshSnapshotSource for InMemoryHost {
    fn selection(&self) -> Vec<MeshRef> {
        self.selection.clone()
    }

    fn snapshot(&self, mesh: &MeshRef) -> Result<MeshSnapshot> {
        self.meshes
            .get(mesh)
            .cloned()
            .ok_or_else(|| InverterError::MeshNotFound(mesh.to_string()))
    }

    fn rest_snapshot(&self, mesh: &MeshRef) -> Result<Option<MeshSnapshot>> {
        if !self.meshes.contains_key(mesh) {
            return Err(InverterError::MeshNotFound(mesh.to_string()));
        }
        Ok(self.rest_meshes.get(mesh).cloned())
    }

    fn chain(&self, mesh: &MeshRef) -> Option<Arc<dyn DeformationMap>> {
        self.chains.get(mesh).cloned()
    }

    fn subscribe(&mut self, mesh: &MeshRef, callback: ChangeCallback) -> Result<()> {
        if !self.meshes.contains_key(mesh) {
            return Err(InverterError::MeshNotFound(mesh.to_string()));
        }
        self.listeners.entry(mesh.clone()).or_default().push(callback);
        Ok(())
    }
}

impl MeshSink for InMemoryHost {
    fn write_shape(
        &mut self,
        name: &str,
        base: &MeshRef,
        shape: &InvertedShape,
        positions: &[DVec3],
    ) -> Result<MeshRef> {
        let template = self
            .meshes
            .get(base)
            .ok_or_else(|| InverterError::MeshNotFound(base.to_string()))?;
        let mesh_ref = self.unique_name(name);
        let mesh = template.with_positions(mesh_ref.name(), positions.to_vec())?;

        log::debug!("写回反算网格 {} (模板 {})", mesh_ref, base);
        self.meshes.insert(mesh_ref.clone(), mesh);
        self.shapes.insert(mesh_ref.clone(), Arc::new(shape.clone()));
        Ok(mesh_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::unit_cube;

    #[test]
    fn test_name_collision_gets_suffix() {
        let mut host = InMemoryHost::new();
        host.insert_mesh(unit_cube("fix_inverted"));
        host.insert_mesh(unit_cube("fix_inverted1"));
        assert_eq!(host.unique_name("fix_inverted").name(), "fix_inverted2");
        assert_eq!(host.unique_name("other").name(), "other");
    }

    #[test]
    fn test_missing_mesh() {
        let host = InMemoryHost::new();
        let missing = MeshRef::new("ghost");
        assert_eq!(
            host.snapshot(&missing).unwrap_err(),
            InverterError::MeshNotFound("ghost".to_string())
        );
        assert!(host.rest_snapshot(&missing).is_err());
        assert!(host.chain(&missing).is_none());
    }

    #[test]
    fn test_set_positions_checks_count() {
        let mut host = InMemoryHost::new();
        let cube = host.insert_mesh(unit_cube("cube"));
        assert!(host.set_positions(&cube, vec![DVec3::ZERO; 3]).is_err());
        assert!(host.set_positions(&cube, vec![DVec3::ONE; 8]).is_ok());
        assert_eq!(host.mesh(&cube).unwrap().positions[0], DVec3::ONE);
    }

    #[test]
    fn test_set_positions_applies_listener_updates() {
        let mut host = InMemoryHost::new();
        let source = host.insert_mesh(unit_cube("source"));
        let mirror = host.insert_mesh(unit_cube("mirror"));
        let target = mirror.clone();
        host.subscribe(
            &source,
            Box::new(move |snapshot: &MeshSnapshot| {
                Some(ShapeUpdate {
                    target: target.clone(),
                    shape: Arc::new(InvertedShape {
                        name: "mirror".to_string(),
                        space: crate::inverter::DeltaSpace::Rest,
                        deltas: vec![DVec3::ZERO; snapshot.vertex_count()],
                        frames: vec![None; snapshot.vertex_count()],
                        skipped: Vec::new(),
                    }),
                    positions: snapshot.positions.clone(),
                })
            }),
        )
        .unwrap();
        assert_eq!(host.listener_count(&source), 1);
        assert!(host.subscribe(&MeshRef::new("ghost"), Box::new(|_: &MeshSnapshot| None)).is_err());

        host.set_positions(&source, vec![DVec3::splat(2.0); 8]).unwrap();
        assert_eq!(host.mesh(&mirror).unwrap().positions[5], DVec3::splat(2.0));
        assert!(host.shape(&mirror).is_some());
    }
}
