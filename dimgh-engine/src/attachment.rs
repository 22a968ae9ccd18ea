use dimgh_core::document::{
    DimensionAnchor, DimensionWitness, Element, ElementGuid, ElementHotspot, ElementKind,
};
use dimgh_core::geometry::Point2;
use dimgh_core::store::ElementStore;
use tracing::debug;

/// 在通用元素上吸附已有热点的最大距离（文档长度单位）。
pub const HOTSPOT_SNAP_TOLERANCE: f64 = 0.1;

/// 热点元素自身的原生热点序号。
const HOTSPOT_NATIVE_INDEX: u32 = 0;

/// 标注端点的关联方式。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttachmentDescriptor {
    /// 直接关联热点，坐标取自文档中热点的当前位置。
    Marker { marker: ElementGuid, position: Point2 },
    /// 关联到通用元素上最近的已有热点。
    Element {
        element: ElementGuid,
        kind: ElementKind,
        position: Point2,
        hotspot_index: u32,
    },
    /// 纯坐标，不随文档编辑更新。
    Free { position: Point2 },
}

impl AttachmentDescriptor {
    #[inline]
    pub fn position(&self) -> Point2 {
        match self {
            AttachmentDescriptor::Marker { position, .. }
            | AttachmentDescriptor::Element { position, .. }
            | AttachmentDescriptor::Free { position } => *position,
        }
    }

    #[inline]
    pub fn marker(&self) -> Option<ElementGuid> {
        match self {
            AttachmentDescriptor::Marker { marker, .. } => Some(*marker),
            _ => None,
        }
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        !matches!(self, AttachmentDescriptor::Free { .. })
    }

    pub fn to_witness(&self) -> DimensionWitness {
        match *self {
            AttachmentDescriptor::Marker { marker, position } => DimensionWitness::anchored(
                position,
                DimensionAnchor {
                    element: marker,
                    kind: ElementKind::Hotspot,
                    hotspot_index: HOTSPOT_NATIVE_INDEX,
                },
            ),
            AttachmentDescriptor::Element {
                element,
                kind,
                position,
                hotspot_index,
            } => DimensionWitness::anchored(
                position,
                DimensionAnchor {
                    element,
                    kind,
                    hotspot_index,
                },
            ),
            AttachmentDescriptor::Free { position } => DimensionWitness::free(position),
        }
    }
}

/// 客户端对单个端点的描述。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointRef {
    pub target: Point2,
    pub hotspot: Option<ElementGuid>,
    pub element: Option<ElementGuid>,
    pub fallback: Point2,
}

impl EndpointRef {
    pub fn new(target: Point2) -> Self {
        Self {
            target,
            hotspot: None,
            element: None,
            fallback: target,
        }
    }

    pub fn with_hotspot(mut self, hotspot: Option<ElementGuid>) -> Self {
        self.hotspot = hotspot;
        self
    }

    pub fn with_element(mut self, element: Option<ElementGuid>) -> Self {
        self.element = element;
        self
    }

    pub fn with_fallback(mut self, fallback: Point2) -> Self {
        self.fallback = fallback;
        self
    }
}

/// 按优先级解析端点：热点 → 元素上最近热点 → 纯坐标。
pub fn resolve_attachment<S: ElementStore>(store: &S, endpoint: &EndpointRef) -> AttachmentDescriptor {
    if let Some(marker) = endpoint.hotspot {
        match store.element(marker) {
            Ok(Element::Hotspot(hotspot)) => {
                return AttachmentDescriptor::Marker {
                    marker,
                    position: hotspot.position,
                };
            }
            Ok(other) => {
                debug!(hotspot = %marker, kind = %other.kind(), "引用的句柄不是热点");
            }
            Err(err) => {
                debug!(hotspot = %marker, error = %err, "无法读取热点");
            }
        }
    }

    if let Some(element) = endpoint.element {
        if let Some((kind, hotspot)) = nearest_hotspot(store, element, endpoint.target) {
            return AttachmentDescriptor::Element {
                element,
                kind,
                position: hotspot.position,
                hotspot_index: hotspot.index,
            };
        }
        debug!(element = %element, "元素上没有足够近的热点，使用纯坐标");
    }

    AttachmentDescriptor::Free {
        position: endpoint.fallback,
    }
}

/// 元素上距 `target` 最近的已有热点，超出吸附容差时返回 `None`。
/// 距离相同时取先出现者。
pub fn nearest_hotspot<S: ElementStore>(
    store: &S,
    element: ElementGuid,
    target: Point2,
) -> Option<(ElementKind, ElementHotspot)> {
    let kind = store.element(element).ok()?.kind();
    let hotspots = store.element_hotspots(element).ok()?;

    let mut best: Option<(ElementHotspot, f64)> = None;
    for hotspot in hotspots {
        let dist = hotspot.position.distance_to(target);
        if best.is_none_or(|(_, min)| dist < min) {
            best = Some((hotspot, dist));
        }
    }

    let (hotspot, dist) = best?;
    if dist > HOTSPOT_SNAP_TOLERANCE {
        return None;
    }
    Some((kind, hotspot))
}

#[cfg(test)]
mod tests {
    use dimgh_core::document::Document;

    use super::*;

    fn hotspot(store: &mut Document, x: f64, y: f64) -> ElementGuid {
        store
            .undoable("CreateHotspot", |store| store.create_hotspot(Point2::new(x, y)))
            .unwrap()
    }

    #[test]
    fn marker_attachment_uses_stored_position() {
        let mut store = Document::new();
        let marker = hotspot(&mut store, 1.0, 1.0);
        let endpoint = EndpointRef::new(Point2::new(1.5, 1.5)).with_hotspot(Some(marker));

        let descriptor = resolve_attachment(&store, &endpoint);
        assert_eq!(
            descriptor,
            AttachmentDescriptor::Marker {
                marker,
                position: Point2::new(1.0, 1.0),
            }
        );
        assert!(descriptor.is_live());
        assert_eq!(descriptor.marker(), Some(marker));
    }

    #[test]
    fn marker_wins_over_element() {
        let mut store = Document::new();
        let marker = hotspot(&mut store, 0.0, 0.0);
        let line = store.add_line(Point2::new(0.0, 0.0), Point2::new(5.0, 0.0), "0");
        let endpoint = EndpointRef::new(Point2::new(0.0, 0.0))
            .with_hotspot(Some(marker))
            .with_element(Some(line));

        assert!(matches!(
            resolve_attachment(&store, &endpoint),
            AttachmentDescriptor::Marker { marker: m, .. } if m == marker
        ));
    }

    #[test]
    fn missing_marker_falls_through_to_element() {
        let mut store = Document::new();
        let line = store.add_line(Point2::new(0.0, 0.0), Point2::new(5.0, 0.0), "0");
        let endpoint = EndpointRef::new(Point2::new(4.95, 0.02))
            .with_hotspot(Some(ElementGuid::new()))
            .with_element(Some(line));

        assert_eq!(
            resolve_attachment(&store, &endpoint),
            AttachmentDescriptor::Element {
                element: line,
                kind: ElementKind::Line,
                position: Point2::new(5.0, 0.0),
                hotspot_index: 2,
            }
        );
    }

    #[test]
    fn element_hotspot_beyond_tolerance_is_ignored() {
        let mut store = Document::new();
        let line = store.add_line(Point2::new(0.0, 0.0), Point2::new(5.0, 0.0), "0");
        let endpoint = EndpointRef::new(Point2::new(1.0, 0.0)).with_element(Some(line));

        assert_eq!(
            resolve_attachment(&store, &endpoint),
            AttachmentDescriptor::Free {
                position: Point2::new(1.0, 0.0)
            }
        );
        assert!(nearest_hotspot(&store, line, Point2::new(0.0, 0.1)).is_some());
        assert!(nearest_hotspot(&store, line, Point2::new(0.0, 0.11)).is_none());
    }

    #[test]
    fn equidistant_hotspots_keep_first() {
        let mut store = Document::new();
        let polyline = store.add_polyline(
            [Point2::new(0.0, 0.0), Point2::new(0.1, 0.0)],
            false,
            "0",
        );
        let (_, hotspot) = nearest_hotspot(&store, polyline, Point2::new(0.05, 0.0)).unwrap();
        assert_eq!(hotspot.index, 1);
    }

    #[test]
    fn non_hotspot_marker_reference_uses_fallback() {
        let mut store = Document::new();
        let line = store.add_line(Point2::new(0.0, 0.0), Point2::new(5.0, 0.0), "0");
        let endpoint = EndpointRef::new(Point2::new(0.0, 0.0))
            .with_hotspot(Some(line))
            .with_fallback(Point2::new(9.0, 9.0));

        let descriptor = resolve_attachment(&store, &endpoint);
        assert_eq!(
            descriptor,
            AttachmentDescriptor::Free {
                position: Point2::new(9.0, 9.0)
            }
        );
        assert!(!descriptor.is_live());
        assert!(descriptor.to_witness().anchor.is_none());
    }
}
