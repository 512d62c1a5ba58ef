//! 实时反算链接
//!
//! 反算结果生成后，修正网格的每次修改都会触发重新计算。每次计算都是
//! 对最新快照的纯函数求值；较早开始但较晚完成的结果会被丢弃，
//! 单次失败只会被记录，不会断开链接。链接可以暂停，暂停期间忽略变更通知。

use crossbeam_channel::{unbounded, Sender};
use glam::DVec3;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};

use crate::config::InverterConfig;
use crate::deform::DeformationMap;
use crate::host::front_of_chain_positions;
use crate::inverter::{invert_snapshots, InvertedShape};
use crate::mesh::MeshSnapshot;
use crate::{InverterError, Result};

type PublishCallback = Box<dyn Fn(&Arc<InvertedShape>) + Send + Sync>;

/// 已发布的结果及其触发序号
struct Published {
    generation: u64,
    shape: Arc<InvertedShape>,
}

/// 常驻的反算链接
pub struct LiveLink {
    base: Arc<MeshSnapshot>,
    rest: Option<Arc<MeshSnapshot>>,
    chain: Option<Arc<dyn DeformationMap>>,
    config: InverterConfig,
    name: Option<String>,
    generation: AtomicU64,
    active: AtomicBool,
    latest: RwLock<Option<Published>>,
    last_error: RwLock<Option<InverterError>>,
    on_publish: Option<PublishCallback>,
}

impl LiveLink {
    /// 只用局部坐标系反算的链接
    pub fn new(base: MeshSnapshot, config: InverterConfig) -> Self {
        Self {
            base: Arc::new(base),
            rest: None,
            chain: None,
            config,
            name: None,
            generation: AtomicU64::new(0),
            active: AtomicBool::new(true),
            latest: RwLock::new(None),
            last_error: RwLock::new(None),
            on_publish: None,
        }
    }

    /// 通过变形链雅可比反算的链接
    pub fn with_chain(mut self, rest: MeshSnapshot, chain: Arc<dyn DeformationMap>) -> Self {
        self.rest = Some(Arc::new(rest));
        self.chain = Some(chain);
        self
    }

    /// 固定结果名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 每次发布新结果时调用（例如写回宿主）
    pub fn on_publish(mut self, callback: impl Fn(&Arc<InvertedShape>) + Send + Sync + 'static) -> Self {
        self.on_publish = Some(Box::new(callback));
        self
    }

    /// 对一份修正网格快照重新计算
    ///
    /// 计算期间若有更新的触发开始，本次结果只返回给调用者，不会发布。
    pub fn recompute(&self, corrected: &MeshSnapshot) -> Result<Arc<InvertedShape>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let result = invert_snapshots(
            &self.base,
            corrected,
            self.rest.as_deref(),
            self.chain.as_deref(),
            &self.config,
        );

        match result {
            Ok(mut shape) => {
                if let Some(name) = &self.name {
                    shape.name = name.clone();
                }
                let shape = Arc::new(shape);
                if self.publish(generation, &shape) {
                    if let Some(callback) = &self.on_publish {
                        callback(&shape);
                    }
                } else {
                    log::debug!("丢弃过期的反算结果: 触发序号 {}", generation);
                }
                Ok(shape)
            }
            Err(e) => {
                log::warn!("实时反算失败 (触发序号 {}): {}", generation, e);
                if let Ok(mut last_error) = self.last_error.write() {
                    *last_error = Some(e.clone());
                }
                Err(e)
            }
        }
    }

    /// 响应一次变更通知
    ///
    /// 暂停、计算失败或结果已过期时返回 None；失败记录在 `last_error` 中。
    pub fn trigger(&self, corrected: &MeshSnapshot) -> Option<Arc<InvertedShape>> {
        if !self.is_active() {
            log::debug!("实时反算链接已暂停，忽略 {} 的变更", corrected.name);
            return None;
        }
        let shape = self.recompute(corrected).ok()?;
        let published = self
            .latest()
            .is_some_and(|latest| Arc::ptr_eq(&latest, &shape));
        published.then_some(shape)
    }

    /// 暂停或恢复链接
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// 把结果叠加到变形链前端得到的顶点位置
    pub fn front_of_chain_positions(&self, shape: &InvertedShape) -> Result<Vec<DVec3>> {
        let rest = self.chain.as_ref().and(self.rest.as_deref());
        front_of_chain_positions(shape, &self.base, rest, &self.config)
    }

    fn publish(&self, generation: u64, shape: &Arc<InvertedShape>) -> bool {
        let Ok(mut latest) = self.latest.write() else {
            return false;
        };
        let newer_started = self.generation.load(Ordering::SeqCst) != generation;
        let already_newer = latest.as_ref().is_some_and(|p| p.generation >= generation);
        if newer_started || already_newer {
            return false;
        }
        *latest = Some(Published {
            generation,
            shape: Arc::clone(shape),
        });
        if let Ok(mut last_error) = self.last_error.write() {
            *last_error = None;
        }
        true
    }

    /// 最近一次发布的结果
    pub fn latest(&self) -> Option<Arc<InvertedShape>> {
        self.latest
            .read()
            .ok()
            .and_then(|latest| latest.as_ref().map(|p| Arc::clone(&p.shape)))
    }

    /// 最近一次发布之后的失败
    pub fn last_error(&self) -> Option<InverterError> {
        self.last_error.read().ok().and_then(|e| e.clone())
    }

    /// 已开始的触发次数
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// 在后台线程上运行，通过通道接收变更通知
    pub fn spawn(self) -> LiveHandle {
        let link = Arc::new(self);
        let (tx, rx) = unbounded::<MeshSnapshot>();
        let worker_link = Arc::clone(&link);

        let worker = thread::spawn(move || {
            while let Ok(mut snapshot) = rx.recv() {
                // 只计算最新的快照
                let mut superseded = 0usize;
                while let Ok(newer) = rx.try_recv() {
                    snapshot = newer;
                    superseded += 1;
                }
                if superseded > 0 {
                    log::debug!("合并了 {} 个过期的变更通知", superseded);
                }
                // 失败已经记录在 last_error 中，链接继续运行
                worker_link.trigger(&snapshot);
            }
            log::debug!("实时反算链接已关闭");
        });

        LiveHandle {
            link,
            sender: Some(tx),
            worker: Some(worker),
        }
    }
}

/// 后台运行中的链接
pub struct LiveHandle {
    link: Arc<LiveLink>,
    sender: Option<Sender<MeshSnapshot>>,
    worker: Option<JoinHandle<()>>,
}

impl LiveHandle {
    /// 发送变更通知
    pub fn notify(&self, corrected: MeshSnapshot) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or_else(|| InverterError::Host("live link is shut down".to_string()))?
            .send(corrected)
            .map_err(|_| InverterError::Host("live link worker stopped".to_string()))
    }

    pub fn link(&self) -> &Arc<LiveLink> {
        &self.link
    }

    /// 最近一次发布的结果
    pub fn latest(&self) -> Option<Arc<InvertedShape>> {
        self.link.latest()
    }

    /// 处理完已排队的通知后停止后台线程
    pub fn shutdown(mut self) -> Arc<LiveLink> {
        self.stop();
        Arc::clone(&self.link)
    }

    fn stop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("实时反算线程异常退出");
            }
        }
    }
}

impl Drop for LiveHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
