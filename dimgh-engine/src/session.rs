use dimgh_core::document::{Element, ElementGuid, ElementKind};
use dimgh_core::geometry::Point2;
use dimgh_core::store::ElementStore;
use tracing::{debug, error, info, warn};

use crate::attachment::HOTSPOT_SNAP_TOLERANCE;
use crate::builder::{DimensionBuilder, DimensionOutcome, DimensionRequest};
use crate::errors::EngineError;
use crate::links::DimensionLinkRegistry;
use crate::markers::{Marker, MarkerRegistry};

#[derive(Debug, Clone, PartialEq)]
pub struct HotspotOutcome {
    pub marker: Marker,
    /// 热点附近（吸附容差内）最近的模型几何元素。
    pub element: Option<ElementGuid>,
    pub created: bool,
}

/// `GetDimensions` 返回的单个标注摘要。
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionSummary {
    pub guid: ElementGuid,
    pub layer: String,
    pub style: String,
    pub text: String,
    pub points: Vec<Point2>,
}

/// 一次会话的全部运行时状态。会话开始时创建，结束时调用 [`Session::teardown`]。
/// 文档本身不归会话所有，每个操作都显式传入。
#[derive(Debug, Default)]
pub struct Session {
    markers: MarkerRegistry,
    links: DimensionLinkRegistry,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn markers(&self) -> &MarkerRegistry {
        &self.markers
    }

    #[inline]
    pub fn links(&self) -> &DimensionLinkRegistry {
        &self.links
    }

    /// 创建热点。带关联 ID 且该 ID 已对应存活热点时复用之；
    /// 坐标变化超过重合容差时先移动它。
    pub fn create_hotspot<S: ElementStore>(
        &mut self,
        store: &mut S,
        position: Point2,
        correlation: Option<&str>,
    ) -> Result<HotspotOutcome, EngineError> {
        if let Some(key) = correlation {
            if let Some(existing) = self.markers.resolve_or_none(&*store, key)? {
                let marker = if existing.position.coincides_with(position) {
                    existing
                } else {
                    let guid = existing.guid;
                    let markers = &mut self.markers;
                    let moved = store
                        .undoable("UpdateHotspot", |store| markers.update_position(store, guid, position))
                        .map_err(|err| {
                            warn!(hotspot = %guid, error = %err, "移动已有热点失败");
                            EngineError::Store(err)
                        })?;
                    debug!(hotspot = %guid, correlation = key, "关联热点坐标已更新");
                    moved
                };
                let element = nearest_model_element(&*store, marker.position);
                return Ok(HotspotOutcome {
                    marker,
                    element,
                    created: false,
                });
            }
        }

        let guid = store
            .undoable("CreateHotspot", |store| store.create_hotspot(position))
            .map_err(|source| {
                error!(error = %source, "创建热点失败");
                EngineError::CreateFailed {
                    what: "hotspot",
                    source,
                }
            })?;
        let marker = self
            .markers
            .register_new(guid, position, correlation.map(str::to_string));
        let element = nearest_model_element(&*store, position);
        info!(hotspot = %guid, x = position.x(), y = position.y(), "已创建热点");
        Ok(HotspotOutcome {
            marker,
            element,
            created: true,
        })
    }

    /// 移动热点。句柄已不存在（或不是热点）时返回 [`EngineError::HotspotNotFound`]。
    pub fn update_hotspot<S: ElementStore>(
        &mut self,
        store: &mut S,
        guid: ElementGuid,
        position: Point2,
    ) -> Result<Marker, EngineError> {
        match store.element(guid) {
            Ok(Element::Hotspot(_)) => {}
            Ok(_) => return Err(EngineError::HotspotNotFound(guid)),
            Err(err) if err.is_not_found() => {
                self.markers.remove(guid);
                return Err(EngineError::HotspotNotFound(guid));
            }
            Err(err) => return Err(err.into()),
        }

        let markers = &mut self.markers;
        let marker = store
            .undoable("UpdateHotspot", |store| markers.update_position(store, guid, position))
            .map_err(|err| {
                warn!(hotspot = %guid, error = %err, "更新热点失败");
                EngineError::Store(err)
            })?;
        debug!(hotspot = %guid, x = position.x(), y = position.y(), "热点已移动");
        Ok(marker)
    }

    /// 删除热点，返回文档中是否确实删除了元素。已不存在的热点视为删除成功。
    pub fn delete_hotspot<S: ElementStore>(
        &mut self,
        store: &mut S,
        guid: ElementGuid,
    ) -> Result<bool, EngineError> {
        match store.element(guid) {
            Ok(Element::Hotspot(_)) => {}
            Ok(other) => {
                return Err(EngineError::InvalidField {
                    field: "hotspotGuid",
                    reason: format!("element is a {}", other.kind()),
                });
            }
            Err(err) if err.is_not_found() => {
                self.markers.remove(guid);
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        }

        store
            .undoable("DeleteHotspot", |store| store.delete_element(guid))
            .map_err(|err| {
                warn!(hotspot = %guid, error = %err, "删除热点失败");
                EngineError::Store(err)
            })?;
        self.markers.remove(guid);
        debug!(hotspot = %guid, "热点已删除");
        Ok(true)
    }

    /// 删除本会话创建的全部热点，返回文档报告的删除数量。
    pub fn delete_all_hotspots<S: ElementStore>(&mut self, store: &mut S) -> usize {
        let deleted = self.markers.remove_all(store);
        info!(count = deleted, "已删除全部热点");
        deleted
    }

    pub fn create_linear_dimension<S: ElementStore>(
        &mut self,
        store: &mut S,
        request: &DimensionRequest,
    ) -> Result<DimensionOutcome, EngineError> {
        DimensionBuilder::new(&mut self.links).build(store, request)
    }

    /// 列出文档中的线性标注，可按图层过滤。
    pub fn list_dimensions<S: ElementStore>(&self, store: &S, filter_layer: Option<&str>) -> Vec<DimensionSummary> {
        store
            .elements_of_kind(ElementKind::LinearDimension)
            .into_iter()
            .filter_map(|guid| match store.element(guid) {
                Ok(Element::LinearDimension(dimension)) => Some((guid, dimension)),
                _ => None,
            })
            .filter(|(_, dimension)| filter_layer.is_none_or(|layer| dimension.style.layer == layer))
            .map(|(guid, dimension)| DimensionSummary {
                guid,
                layer: dimension.style.layer.clone(),
                style: dimension.style.style_name.clone(),
                text: dimension.text(),
                points: dimension.witnesses.iter().map(|witness| witness.location).collect(),
            })
            .collect()
    }

    /// 结束会话：删除全部热点并清空标注登记。
    pub fn teardown<S: ElementStore>(&mut self, store: &mut S) -> usize {
        let deleted = self.markers.remove_all(store);
        let links = self.links.len();
        self.links.clear();
        info!(hotspots = deleted, links, "会话已结束");
        deleted
    }
}

/// 与 `position` 距离在吸附容差内、最近的模型几何元素（不含热点与标注）。
fn nearest_model_element<S: ElementStore>(store: &S, position: Point2) -> Option<ElementGuid> {
    store
        .elements_near(position, HOTSPOT_SNAP_TOLERANCE)
        .into_iter()
        .find(|guid| matches!(store.element(*guid), Ok(element) if element.kind().is_model_geometry()))
}
