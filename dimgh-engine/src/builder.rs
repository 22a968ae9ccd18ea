use dimgh_core::document::{DimensionGeometry, ElementGuid};
use dimgh_core::geometry::{COINCIDENCE_TOLERANCE, Point2, Vector2, perpendicular};
use dimgh_core::store::ElementStore;
use tracing::{debug, error, info, warn};

use crate::attachment::{AttachmentDescriptor, EndpointRef, resolve_attachment};
use crate::errors::EngineError;
use crate::links::DimensionLinkRegistry;

/// 一次线性标注请求：两个端点及垂直偏移量。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionRequest {
    pub start: EndpointRef,
    pub end: EndpointRef,
    pub offset: f64,
}

impl DimensionRequest {
    pub fn new(start: EndpointRef, end: EndpointRef) -> Self {
        Self {
            start,
            end,
            offset: 0.0,
        }
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }
}

/// 按请求计算出的标注数据，只在单次调用内存在。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionPlan {
    pub start: AttachmentDescriptor,
    pub end: AttachmentDescriptor,
    pub direction: Vector2,
    pub base_point: Point2,
    pub offset: f64,
    pub length: f64,
}

impl DimensionPlan {
    /// 校验并解析请求。两点重合时在访问文档之前返回错误。
    pub fn plan<S: ElementStore>(store: &S, request: &DimensionRequest) -> Result<Self, EngineError> {
        let pt1 = request.start.target;
        let pt2 = request.end.target;
        let direction = pt1.vector_to(pt2);
        let length = direction.length();
        if length < COINCIDENCE_TOLERANCE {
            return Err(EngineError::PointsTooClose);
        }

        let start = resolve_attachment(store, &request.start);
        let end = resolve_attachment(store, &request.end);

        Ok(Self {
            start,
            end,
            direction,
            base_point: offset_base_point(pt1, direction, request.offset),
            offset: request.offset,
            length,
        })
    }

    /// 两端都关联热点时返回热点对。
    pub fn marker_pair(&self) -> Option<(ElementGuid, ElementGuid)> {
        Some((self.start.marker()?, self.end.marker()?))
    }

    pub fn geometry(&self) -> DimensionGeometry {
        DimensionGeometry {
            reference: self.base_point,
            direction: self.direction,
            witnesses: [self.start.to_witness(), self.end.to_witness()],
        }
    }
}

/// 偏移量绝对值超过容差时，沿方向的左法线平移基点。
pub fn offset_base_point(base: Point2, direction: Vector2, offset: f64) -> Point2 {
    if offset.abs() <= COINCIDENCE_TOLERANCE {
        return base;
    }
    match perpendicular(direction) {
        Some(normal) => base.translate(normal.scale(offset)),
        None => base,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionOutcome {
    pub dimension: ElementGuid,
    pub distance: f64,
    pub created: bool,
}

/// 创建线性标注；同一对热点重复请求时返回已有标注。
pub struct DimensionBuilder<'a> {
    links: &'a mut DimensionLinkRegistry,
}

impl<'a> DimensionBuilder<'a> {
    pub fn new(links: &'a mut DimensionLinkRegistry) -> Self {
        Self { links }
    }

    pub fn build<S: ElementStore>(
        &mut self,
        store: &mut S,
        request: &DimensionRequest,
    ) -> Result<DimensionOutcome, EngineError> {
        let plan = DimensionPlan::plan(&*store, request)?;

        if let Some((a, b)) = plan.marker_pair() {
            if let Some(existing) = self.links.find(&*store, a, b)? {
                debug!(dimension = %existing, first = %a, second = %b, "热点对已有标注，直接返回");
                return Ok(DimensionOutcome {
                    dimension: existing,
                    distance: plan.length,
                    created: false,
                });
            }
        }

        let geometry = plan.geometry();
        let dimension = store
            .undoable("CreateLinearDimension", |store| {
                store.create_linear_dimension(geometry)
            })
            .map_err(|source| {
                error!(error = %source, "创建线性标注失败");
                EngineError::CreateFailed {
                    what: "dimension",
                    source,
                }
            })?;

        if let Some((a, b)) = plan.marker_pair() {
            if let Err(err) = self.links.register(&*store, a, b, dimension) {
                warn!(dimension = %dimension, error = %err, "标注已创建，但登记热点对失败");
            }
        }

        info!(
            dimension = %dimension,
            distance = plan.length,
            live_start = plan.start.is_live(),
            live_end = plan.end.is_live(),
            "已创建线性标注"
        );
        Ok(DimensionOutcome {
            dimension,
            distance: plan.length,
            created: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use dimgh_core::document::{Document, Element, ElementKind};

    use super::*;
    use crate::testing::FlakyStore;

    fn hotspot<S: ElementStore>(store: &mut S, x: f64, y: f64) -> ElementGuid {
        store
            .undoable("CreateHotspot", |store| store.create_hotspot(Point2::new(x, y)))
            .unwrap()
    }

    fn marker_request(a: ElementGuid, pa: Point2, b: ElementGuid, pb: Point2) -> DimensionRequest {
        DimensionRequest::new(
            EndpointRef::new(pa).with_hotspot(Some(a)),
            EndpointRef::new(pb).with_hotspot(Some(b)),
        )
    }

    #[test]
    fn offset_shifts_along_left_normal() {
        let base = Point2::new(2.0, 3.0);
        let shifted = offset_base_point(base, Vector2::new(1.0, 0.0), 1.5);
        assert!((shifted.x() - 2.0).abs() < 1e-12);
        assert!((shifted.y() - 4.5).abs() < 1e-12);

        let shifted = offset_base_point(base, Vector2::new(0.0, 4.0), 2.0);
        assert!((shifted.x() - 0.0).abs() < 1e-12);
        assert!((shifted.y() - 3.0).abs() < 1e-12);

        assert_eq!(offset_base_point(base, Vector2::new(1.0, 0.0), 5e-7), base);
    }

    #[test]
    fn coincident_points_are_rejected_without_store_mutation() {
        let mut store = Document::new();
        let mut links = DimensionLinkRegistry::new();
        let request = DimensionRequest::new(
            EndpointRef::new(Point2::new(1.0, 1.0)),
            EndpointRef::new(Point2::new(1.0, 1.0 + 5e-7)),
        );

        let err = DimensionBuilder::new(&mut links).build(&mut store, &request).unwrap_err();
        assert!(matches!(err, EngineError::PointsTooClose));
        assert!(store.is_empty());
        assert_eq!(store.transaction_names().count(), 0);
    }

    #[test]
    fn repeated_marker_pair_returns_same_dimension() {
        let mut store = Document::new();
        let mut links = DimensionLinkRegistry::new();
        let pa = Point2::new(0.0, 0.0);
        let pb = Point2::new(10.0, 0.0);
        let a = hotspot(&mut store, pa.x(), pa.y());
        let b = hotspot(&mut store, pb.x(), pb.y());

        let first = DimensionBuilder::new(&mut links)
            .build(&mut store, &marker_request(a, pa, b, pb))
            .unwrap();
        let second = DimensionBuilder::new(&mut links)
            .build(&mut store, &marker_request(b, pb, a, pa))
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.dimension, second.dimension);
        assert!((first.distance - 10.0).abs() < 1e-12);
        assert_eq!(store.count_of_kind(ElementKind::LinearDimension), 1);
    }

    #[test]
    fn deleted_dimension_is_recreated() {
        let mut store = Document::new();
        let mut links = DimensionLinkRegistry::new();
        let pa = Point2::new(0.0, 0.0);
        let pb = Point2::new(0.0, 3.0);
        let a = hotspot(&mut store, pa.x(), pa.y());
        let b = hotspot(&mut store, pb.x(), pb.y());
        let request = marker_request(a, pa, b, pb);

        let first = DimensionBuilder::new(&mut links).build(&mut store, &request).unwrap();
        store
            .undoable("External", |store| store.delete_element(first.dimension))
            .unwrap();
        let second = DimensionBuilder::new(&mut links).build(&mut store, &request).unwrap();

        assert!(second.created);
        assert_ne!(first.dimension, second.dimension);
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn free_endpoints_are_not_deduplicated() {
        let mut store = Document::new();
        let mut links = DimensionLinkRegistry::new();
        let request = DimensionRequest::new(
            EndpointRef::new(Point2::new(0.0, 0.0)),
            EndpointRef::new(Point2::new(4.0, 0.0)),
        );

        let first = DimensionBuilder::new(&mut links).build(&mut store, &request).unwrap();
        let second = DimensionBuilder::new(&mut links).build(&mut store, &request).unwrap();
        assert_ne!(first.dimension, second.dimension);
        assert!(links.is_empty());
    }

    #[test]
    fn created_dimension_carries_attachments_and_offset() {
        let mut store = Document::new();
        let mut links = DimensionLinkRegistry::new();
        let a = hotspot(&mut store, 0.0, 0.0);
        let line = store.add_line(Point2::new(8.0, -2.0), Point2::new(8.0, 2.0), "WALLS");
        let request = DimensionRequest::new(
            EndpointRef::new(Point2::new(0.0, 0.0)).with_hotspot(Some(a)),
            EndpointRef::new(Point2::new(8.05, 0.0)).with_element(Some(line)),
        )
        .with_offset(-1.0);

        let outcome = DimensionBuilder::new(&mut links).build(&mut store, &request).unwrap();
        let Some(Element::LinearDimension(dimension)) = store.get(outcome.dimension) else {
            panic!("expected dimension");
        };
        assert_eq!(dimension.reference, Point2::new(0.0, -1.0));
        let start = dimension.witnesses[0].anchor.expect("start anchored");
        assert_eq!(start.element, a);
        let end = dimension.witnesses[1].anchor.expect("end anchored");
        assert_eq!(end.element, line);
        assert_eq!(end.hotspot_index, 3);
        assert_eq!(dimension.witnesses[1].location, Point2::new(8.0, 0.0));
        assert!(links.is_empty());
    }

    #[test]
    fn store_failure_is_reported_and_nothing_is_linked() {
        let mut store = FlakyStore::new();
        let mut links = DimensionLinkRegistry::new();
        let pa = Point2::new(0.0, 0.0);
        let pb = Point2::new(1.0, 0.0);
        let a = hotspot(&mut store, pa.x(), pa.y());
        let b = hotspot(&mut store, pb.x(), pb.y());
        store.fail_dimension_create = true;

        let err = DimensionBuilder::new(&mut links)
            .build(&mut store, &marker_request(a, pa, b, pb))
            .unwrap_err();
        assert!(matches!(err, EngineError::CreateFailed { what: "dimension", .. }));
        assert_eq!(err.to_string(), "failed to create dimension");
        assert!(links.is_empty());
        assert_eq!(store.inner.count_of_kind(ElementKind::LinearDimension), 0);
    }
}
