use std::collections::HashMap;

use dimgh_core::document::{Element, ElementGuid, ElementKind};
use dimgh_core::geometry::Point2;
use dimgh_core::store::{ElementStore, StoreError};
use tracing::{debug, warn};

/// 已登记的热点。`correlation` 为客户端给出的关联 ID（如 Rhino 点的 GUID）。
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub guid: ElementGuid,
    pub position: Point2,
    pub correlation: Option<String>,
}

/// 会话内创建的热点登记表：维护追踪列表以及关联 ID → 热点句柄的映射。
/// 每个关联 ID 至多对应一个热点；无关联 ID 的热点不参与去重。
#[derive(Debug, Default)]
pub struct MarkerRegistry {
    tracked: Vec<Marker>,
    by_correlation: HashMap<String, ElementGuid>,
}

impl MarkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn get(&self, guid: ElementGuid) -> Option<&Marker> {
        self.tracked.iter().find(|marker| marker.guid == guid)
    }

    #[inline]
    pub fn contains(&self, guid: ElementGuid) -> bool {
        self.get(guid).is_some()
    }

    /// 按关联 ID 查找热点。文档中对应元素已确认不存在时清理映射并返回 `None`；
    /// 其余文档错误原样返回，不触发清理。
    pub fn resolve_or_none<S: ElementStore>(
        &mut self,
        store: &S,
        correlation: &str,
    ) -> Result<Option<Marker>, StoreError> {
        let Some(guid) = self.by_correlation.get(correlation).copied() else {
            return Ok(None);
        };
        match store.element(guid) {
            Ok(Element::Hotspot(hotspot)) => {
                let position = hotspot.position;
                let marker = self.track(guid, position, Some(correlation.to_string()));
                Ok(Some(marker))
            }
            Ok(other) => {
                debug!(
                    hotspot = %guid,
                    kind = %other.kind(),
                    correlation,
                    "关联句柄已不是热点，移除映射"
                );
                self.remove(guid);
                Ok(None)
            }
            Err(err) if err.is_not_found() => {
                debug!(hotspot = %guid, correlation, "热点已被外部删除，移除映射");
                self.remove(guid);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// 登记新创建的热点。关联 ID 已存在时按更新处理：旧句柄被替换，不产生重复条目。
    pub fn register_new(
        &mut self,
        guid: ElementGuid,
        position: Point2,
        correlation: Option<String>,
    ) -> Marker {
        if let Some(key) = correlation.as_deref() {
            if let Some(previous) = self.by_correlation.get(key).copied() {
                if previous != guid {
                    debug!(previous = %previous, hotspot = %guid, correlation = key, "关联 ID 重新登记");
                    self.tracked.retain(|marker| marker.guid != previous);
                }
            }
        }
        self.track(guid, position, correlation)
    }

    /// 在文档中移动热点并同步登记表。调用方负责开启事务。
    /// 未登记的热点只移动，不纳入追踪列表。
    pub fn update_position<S: ElementStore>(
        &mut self,
        store: &mut S,
        guid: ElementGuid,
        position: Point2,
    ) -> Result<Marker, StoreError> {
        store.move_hotspot(guid, position)?;
        match self.tracked.iter_mut().find(|marker| marker.guid == guid) {
            Some(existing) => {
                existing.position = position;
                Ok(existing.clone())
            }
            None => Ok(Marker {
                guid,
                position,
                correlation: None,
            }),
        }
    }

    /// 从追踪列表和关联映射中移除热点；未登记的热点直接忽略。
    pub fn remove(&mut self, guid: ElementGuid) -> bool {
        let before = self.tracked.len();
        self.tracked.retain(|marker| marker.guid != guid);
        self.by_correlation.retain(|_, tracked| *tracked != guid);
        before != self.tracked.len()
    }

    /// 批量删除全部已登记热点。无论文档删除是否成功，本地状态都会清空。
    /// 返回文档报告的删除数量。
    pub fn remove_all<S: ElementStore>(&mut self, store: &mut S) -> usize {
        if self.tracked.is_empty() {
            self.by_correlation.clear();
            return 0;
        }
        let guids: Vec<ElementGuid> = self.tracked.iter().map(|marker| marker.guid).collect();
        let deleted = match store.undoable("DeleteAllHotspots", |store| store.delete_elements(&guids)) {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, requested = guids.len(), "批量删除热点失败，仍清空登记表");
                0
            }
        };
        self.tracked.clear();
        self.by_correlation.clear();
        deleted
    }

    fn track(&mut self, guid: ElementGuid, position: Point2, correlation: Option<String>) -> Marker {
        if let Some(key) = correlation.as_ref() {
            self.by_correlation.insert(key.clone(), guid);
        }
        match self.tracked.iter_mut().find(|marker| marker.guid == guid) {
            Some(existing) => {
                existing.position = position;
                if correlation.is_some() {
                    existing.correlation = correlation;
                }
                existing.clone()
            }
            None => {
                let marker = Marker {
                    guid,
                    position,
                    correlation,
                };
                self.tracked.push(marker.clone());
                marker
            }
        }
    }
}

/// 判断句柄在文档中是否为存活的热点。
pub fn is_live_hotspot<S: ElementStore>(store: &S, guid: ElementGuid) -> bool {
    matches!(store.element(guid), Ok(element) if element.kind() == ElementKind::Hotspot)
}
