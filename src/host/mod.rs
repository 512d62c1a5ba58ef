//! 宿主适配层
//!
//! 宿主场景图被抽象成读取接口 [`MeshSnapshotSource`] 和写回接口 [`MeshSink`]，
//! 反算本身不依赖任何宿主 API。修正网格之后的每次修改通过宿主的变更通知
//! 回调到 [`LiveLink`]，重新计算并更新已写回的反算网格。

mod memory;

pub use memory::InMemoryHost;

use glam::DVec3;
use std::fmt;
use std::sync::Arc;

use crate::config::InverterConfig;
use crate::deform::{BlendShape, DeformationMap};
use crate::inverter::{default_shape_name, InvertedShape};
use crate::live::LiveLink;
use crate::mesh::MeshSnapshot;
use crate::{InverterError, Result};

/// 宿主中网格的引用
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshRef(pub String);

impl MeshRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MeshRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MeshRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// 实时链接对已写回网格的更新
#[derive(Clone, Debug)]
pub struct ShapeUpdate {
    /// 被更新的反算网格
    pub target: MeshRef,
    pub shape: Arc<InvertedShape>,
    pub positions: Vec<DVec3>,
}

/// 网格变更回调，返回需要宿主应用的更新
pub type ChangeCallback = Box<dyn Fn(&MeshSnapshot) -> Option<ShapeUpdate> + Send + Sync>;

/// 从宿主读取网格数据
pub trait MeshSnapshotSource {
    /// 当前选中的网格，按选择顺序
    fn selection(&self) -> Vec<MeshRef>;

    /// 网格当前（变形后）的顶点位置和拓扑
    fn snapshot(&self, mesh: &MeshRef) -> Result<MeshSnapshot>;

    /// 变形链输入端的静止网格，没有变形链时为 None
    fn rest_snapshot(&self, mesh: &MeshRef) -> Result<Option<MeshSnapshot>>;

    /// 网格的前向变形链
    fn chain(&self, mesh: &MeshRef) -> Option<Arc<dyn DeformationMap>>;

    /// 注册变更通知：网格顶点位置变化后以新快照调用 `callback`，
    /// 并应用其返回的更新
    fn subscribe(&mut self, mesh: &MeshRef, callback: ChangeCallback) -> Result<()>;
}

/// 把反算结果写回宿主
pub trait MeshSink {
    /// 以 `base` 为模板创建反算网格，返回新网格的引用
    fn write_shape(
        &mut self,
        name: &str,
        base: &MeshRef,
        shape: &InvertedShape,
        positions: &[DVec3],
    ) -> Result<MeshRef>;
}

/// 把修正形状反算到变形链前端
///
/// `source` / `target` 任一缺省时使用宿主当前选择（先选基础网格，再选修正网格）。
/// 结果名称缺省为 `<corrected>_inverted`。
pub fn invert<H>(
    host: &mut H,
    source: Option<MeshRef>,
    target: Option<MeshRef>,
    name: Option<&str>,
) -> Result<MeshRef>
where
    H: MeshSnapshotSource + MeshSink,
{
    let config = crate::config::get_config();
    invert_with_config(host, source, target, name, &config)
}

/// 同 [`invert`]，显式传入配置
pub fn invert_with_config<H>(
    host: &mut H,
    source: Option<MeshRef>,
    target: Option<MeshRef>,
    name: Option<&str>,
    config: &InverterConfig,
) -> Result<MeshRef>
where
    H: MeshSnapshotSource + MeshSink,
{
    invert_live(host, source, target, name, config).map(|(written, _)| written)
}

/// 同 [`invert_with_config`]，同时返回驱动反算网格的实时链接
///
/// 修正网格之后的修改会重新反算并更新写回的网格，
/// 可通过 [`LiveLink::set_active`] 暂停。
pub fn invert_live<H>(
    host: &mut H,
    source: Option<MeshRef>,
    target: Option<MeshRef>,
    name: Option<&str>,
    config: &InverterConfig,
) -> Result<(MeshRef, Arc<LiveLink>)>
where
    H: MeshSnapshotSource + MeshSink,
{
    let (base_ref, corrected_ref) = match (source, target) {
        (Some(base), Some(corrected)) => (base, corrected),
        _ => resolve_selection(host.selection())?,
    };

    let base = host.snapshot(&base_ref)?;
    let corrected = host.snapshot(&corrected_ref)?;
    let rest = host.rest_snapshot(&base_ref)?;
    let chain = host.chain(&base_ref);

    log::info!(
        "反算修正形状: base={}, corrected={}, 变形链={}",
        base_ref,
        corrected_ref,
        chain.as_ref().map_or("none", |c| c.name()),
    );

    let shape_name = name.map_or_else(|| default_shape_name(corrected_ref.name()), str::to_string);
    let mut link = LiveLink::new(base, config.clone()).with_name(shape_name.clone());
    if let (Some(rest), Some(chain)) = (rest, chain) {
        link = link.with_chain(rest, chain);
    }
    let link = Arc::new(link);

    let shape = link.recompute(&corrected)?;
    let positions = link.front_of_chain_positions(&shape)?;
    let written = host.write_shape(&shape_name, &base_ref, &shape, &positions)?;

    let callback_link = Arc::clone(&link);
    let update_target = written.clone();
    host.subscribe(
        &corrected_ref,
        Box::new(move |snapshot: &MeshSnapshot| {
            let shape = callback_link.trigger(snapshot)?;
            match callback_link.front_of_chain_positions(&shape) {
                Ok(positions) => Some(ShapeUpdate {
                    target: update_target.clone(),
                    shape,
                    positions,
                }),
                Err(e) => {
                    log::warn!("实时反算结果无法写回 {}: {}", update_target, e);
                    None
                }
            }
        }),
    )?;

    log::info!("反算网格已生成: {}", written);
    Ok((written, link))
}

/// 选择必须正好是两个网格
fn resolve_selection(selection: Vec<MeshRef>) -> Result<(MeshRef, MeshRef)> {
    let count = selection.len();
    let mut iter = selection.into_iter();
    match (iter.next(), iter.next(), iter.next()) {
        (Some(base), Some(corrected), None) => Ok((base, corrected)),
        _ => Err(InverterError::Selection { count }),
    }
}

/// 反算网格的顶点位置：静止网格叠加增量
///
/// 宿主没有静止网格时把基础网格当作自身的静止姿态。
pub fn front_of_chain_positions(
    shape: &InvertedShape,
    base: &MeshSnapshot,
    rest: Option<&MeshSnapshot>,
    config: &InverterConfig,
) -> Result<Vec<DVec3>> {
    let rest = rest.unwrap_or(base);
    let blend = BlendShape::new(
        Arc::new(shape.clone()),
        Arc::clone(&rest.topology),
        config.clone(),
    );
    blend.deform(&rest.positions)
}
