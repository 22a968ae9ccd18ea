use std::collections::HashMap;

use dimgh_core::document::{ElementGuid, ElementKind};
use dimgh_core::store::{ElementStore, StoreError};
use tracing::debug;

/// 无序热点对：(A, B) 与 (B, A) 相等。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerPair {
    low: ElementGuid,
    high: ElementGuid,
}

impl MarkerPair {
    pub fn new(a: ElementGuid, b: ElementGuid) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    #[inline]
    pub fn members(&self) -> (ElementGuid, ElementGuid) {
        (self.low, self.high)
    }

    #[inline]
    pub fn contains(&self, guid: ElementGuid) -> bool {
        self.low == guid || self.high == guid
    }
}

/// 热点对 → 标注句柄的登记表，保证同一对热点之间至多一个存活标注。
/// 过期条目只在查找时惰性清理。
#[derive(Debug, Default)]
pub struct DimensionLinkRegistry {
    links: HashMap<MarkerPair, ElementGuid>,
}

impl DimensionLinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// 查找两热点之间已有的标注。标注在文档中已确认不存在时移除条目并返回 `None`。
    pub fn find<S: ElementStore>(
        &mut self,
        store: &S,
        a: ElementGuid,
        b: ElementGuid,
    ) -> Result<Option<ElementGuid>, StoreError> {
        let pair = MarkerPair::new(a, b);
        let Some(dimension) = self.links.get(&pair).copied() else {
            return Ok(None);
        };
        match store.element(dimension) {
            Ok(element) if element.kind() == ElementKind::LinearDimension => Ok(Some(dimension)),
            Ok(_) => {
                debug!(dimension = %dimension, "登记的句柄已不是标注，移除");
                self.links.remove(&pair);
                Ok(None)
            }
            Err(err) if err.is_not_found() => {
                debug!(dimension = %dimension, "标注已被删除，移除登记");
                self.links.remove(&pair);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// 登记新标注。若该热点对已有存活标注则保持不变并返回 `false`。
    pub fn register<S: ElementStore>(
        &mut self,
        store: &S,
        a: ElementGuid,
        b: ElementGuid,
        dimension: ElementGuid,
    ) -> Result<bool, StoreError> {
        if self.find(store, a, b)?.is_some() {
            return Ok(false);
        }
        self.links.insert(MarkerPair::new(a, b), dimension);
        Ok(true)
    }

    /// 丢弃全部登记，不访问文档。
    pub fn clear(&mut self) {
        self.links.clear();
    }
}
