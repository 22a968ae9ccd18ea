pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 两点重合、方向退化的判定容差（文档长度单位）。
    pub const COINCIDENCE_TOLERANCE: f64 = 1e-6;

    /// 二维点，内部以 `glam::DVec2` 表示，与宿主文档的双精度坐标一致。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn distance_to(self, other: Point2) -> f64 {
            distance(self, other)
        }

        /// 判定两点是否在重合容差之内（含边界）。
        #[inline]
        pub fn coincides_with(self, other: Point2) -> bool {
            distance(self, other) <= COINCIDENCE_TOLERANCE
        }

        /// 将点正交投影到经过 `origin`、方向为 `direction` 的直线上。
        /// 方向退化时原样返回。
        pub fn project_onto_line(self, origin: Point2, direction: Vector2) -> Point2 {
            let dir = direction.0;
            let len_sq = dir.length_squared();
            if len_sq <= f64::EPSILON {
                return self;
            }
            let t = (self.0 - origin.0).dot(dir) / len_sq;
            Point2(origin.0 + dir * t)
        }

        /// 点到线段的最短距离。
        pub fn distance_to_segment(self, start: Point2, end: Point2) -> f64 {
            let seg = end.0 - start.0;
            let len_sq = seg.length_squared();
            if len_sq <= f64::EPSILON {
                return distance(self, start);
            }
            let t = ((self.0 - start.0).dot(seg) / len_sq).clamp(0.0, 1.0);
            self.0.distance(start.0 + seg * t)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn length(self) -> f64 {
            self.0.length()
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        #[inline]
        pub fn scale(self, factor: f64) -> Self {
            Self(self.0 * factor)
        }

        #[inline]
        pub fn dot(self, other: Vector2) -> f64 {
            self.0.dot(other.0)
        }

        /// 逆时针旋转 90° 后的单位法向量，见 [`perpendicular`]。
        #[inline]
        pub fn perpendicular(self) -> Option<Self> {
            perpendicular(self)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 两点间欧氏距离。
    #[inline]
    pub fn distance(a: Point2, b: Point2) -> f64 {
        a.0.distance(b.0)
    }

    /// 方向 (dx, dy) 长度为 L 时返回 (-dy/L, dx/L)；长度退化时返回 `None`。
    pub fn perpendicular(direction: Vector2) -> Option<Vector2> {
        let len = direction.length();
        if len <= f64::EPSILON {
            None
        } else {
            Some(Vector2::new(-direction.y() / len, direction.x() / len))
        }
    }

}

pub mod document {
    use std::collections::{HashMap, VecDeque};
    use std::fmt;
    use std::str::FromStr;

    use serde::{Deserialize, Serialize};
    use thiserror::Error;
    use uuid::Uuid;

    use crate::geometry::{Point2, Vector2};
    use crate::store::{ElementStore, StoreError};

    pub const DEFAULT_UNDO_DEPTH: usize = 64;
    pub const DEFAULT_HOTSPOT_LAYER: &str = "Hotspots";
    pub const DEFAULT_DIMENSION_LAYER: &str = "Dimensions";

    /// 宿主文档中的元素句柄（GUID）。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ElementGuid(Uuid);

    impl ElementGuid {
        /// 分配一个新的随机句柄。
        #[inline]
        pub fn new() -> Self {
            Self(Uuid::new_v4())
        }

        #[inline]
        pub fn from_uuid(uuid: Uuid) -> Self {
            Self(uuid)
        }

        #[inline]
        pub fn as_uuid(self) -> Uuid {
            self.0
        }
    }

    impl Default for ElementGuid {
        fn default() -> Self {
            Self::new()
        }
    }

    impl fmt::Display for ElementGuid {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let mut buffer = Uuid::encode_buffer();
            f.write_str(self.0.hyphenated().encode_upper(&mut buffer))
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    #[error("invalid element guid {input:?}")]
    pub struct ParseGuidError {
        pub input: String,
    }

    impl FromStr for ElementGuid {
        type Err = ParseGuidError;

        /// 接受带或不带花括号的 GUID 文本，大小写不敏感。
        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let trimmed = s.trim().trim_start_matches('{').trim_end_matches('}');
            Uuid::parse_str(trimmed)
                .map(Self)
                .map_err(|_| ParseGuidError {
                    input: s.to_string(),
                })
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ElementKind {
        Hotspot,
        LinearDimension,
        Line,
        Polyline,
        Circle,
    }

    impl ElementKind {
        pub fn as_str(self) -> &'static str {
            match self {
                ElementKind::Hotspot => "hotspot",
                ElementKind::LinearDimension => "linear dimension",
                ElementKind::Line => "line",
                ElementKind::Polyline => "polyline",
                ElementKind::Circle => "circle",
            }
        }

        /// 模型几何元素（热点与标注之外的元素）。
        #[inline]
        pub fn is_model_geometry(self) -> bool {
            matches!(
                self,
                ElementKind::Line | ElementKind::Polyline | ElementKind::Circle
            )
        }
    }

    impl fmt::Display for ElementKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Layer {
        pub name: String,
        pub is_visible: bool,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                is_visible: true,
            }
        }
    }

    /// 元素上可供标注关联的点，`index` 为宿主原生的热点序号。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct ElementHotspot {
        pub index: u32,
        pub position: Point2,
    }

    impl ElementHotspot {
        #[inline]
        pub fn new(index: u32, position: Point2) -> Self {
            Self { index, position }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Hotspot {
        pub position: Point2,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point2,
        pub end: Point2,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Polyline {
        pub vertices: Vec<Point2>,
        pub is_closed: bool,
        pub layer: String,
    }

    impl Polyline {
        fn segments(&self) -> impl Iterator<Item = (Point2, Point2)> + '_ {
            let closing = if self.is_closed && self.vertices.len() > 2 {
                self.vertices.last().copied().zip(self.vertices.first().copied())
            } else {
                None
            };
            self.vertices
                .windows(2)
                .map(|pair| (pair[0], pair[1]))
                .chain(closing)
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point2,
        pub radius: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ArrowKind {
        ClosedFilled,
        Open,
        Tick,
        Dot,
    }

    /// 标注的非几何属性。新建标注时由文档按“上次使用的样式”整体拷贝。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DimensionStyle {
        pub style_name: String,
        pub arrow: ArrowKind,
        pub precision: usize,
        pub layer: String,
    }

    impl Default for DimensionStyle {
        fn default() -> Self {
            Self {
                style_name: "Standard".to_string(),
                arrow: ArrowKind::ClosedFilled,
                precision: 2,
                layer: DEFAULT_DIMENSION_LAYER.to_string(),
            }
        }
    }

    /// 标注端点对其它元素的关联。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct DimensionAnchor {
        pub element: ElementGuid,
        pub kind: ElementKind,
        pub hotspot_index: u32,
    }

    /// 标注的一个端点：`location` 为被测点，`anchor` 为空时不随文档编辑更新。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct DimensionWitness {
        pub location: Point2,
        pub anchor: Option<DimensionAnchor>,
    }

    impl DimensionWitness {
        #[inline]
        pub fn free(location: Point2) -> Self {
            Self {
                location,
                anchor: None,
            }
        }

        #[inline]
        pub fn anchored(location: Point2, anchor: DimensionAnchor) -> Self {
            Self {
                location,
                anchor: Some(anchor),
            }
        }
    }

    /// 创建线性标注时由调用方提供的几何部分。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct DimensionGeometry {
        pub reference: Point2,
        pub direction: Vector2,
        pub witnesses: [DimensionWitness; 2],
    }

    /// 线性标注：标注线经过 `reference`，沿 `direction` 方向。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LinearDimension {
        pub reference: Point2,
        pub direction: Vector2,
        pub witnesses: [DimensionWitness; 2],
        pub style: DimensionStyle,
    }

    impl LinearDimension {
        /// 端点在标注线上的落点。
        pub fn witness_position(&self, index: usize) -> Option<Point2> {
            self.witnesses
                .get(index)
                .map(|witness| witness.location.project_onto_line(self.reference, self.direction))
        }

        /// 沿标注方向的测量值。
        pub fn measurement(&self) -> f64 {
            let len = self.direction.length();
            if len <= f64::EPSILON {
                return 0.0;
            }
            let span = self.witnesses[0].location.vector_to(self.witnesses[1].location);
            (span.dot(self.direction) / len).abs()
        }

        /// 按样式精度格式化的标注文字。
        pub fn text(&self) -> String {
            format!("{:.*}", self.style.precision, self.measurement())
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Element {
        Hotspot(Hotspot),
        LinearDimension(LinearDimension),
        Line(Line),
        Polyline(Polyline),
        Circle(Circle),
    }

    impl Element {
        #[inline]
        pub fn kind(&self) -> ElementKind {
            match self {
                Element::Hotspot(_) => ElementKind::Hotspot,
                Element::LinearDimension(_) => ElementKind::LinearDimension,
                Element::Line(_) => ElementKind::Line,
                Element::Polyline(_) => ElementKind::Polyline,
                Element::Circle(_) => ElementKind::Circle,
            }
        }

        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Element::Hotspot(hotspot) => &hotspot.layer,
                Element::LinearDimension(dimension) => &dimension.style.layer,
                Element::Line(line) => &line.layer,
                Element::Polyline(polyline) => &polyline.layer,
                Element::Circle(circle) => &circle.layer,
            }
        }

        /// 元素上已有的可关联点，顺序与宿主返回的顺序一致。
        pub fn hotspots(&self) -> Vec<ElementHotspot> {
            match self {
                Element::Hotspot(hotspot) => vec![ElementHotspot::new(0, hotspot.position)],
                Element::LinearDimension(dimension) => dimension
                    .witnesses
                    .iter()
                    .zip(1u32..)
                    .map(|(witness, index)| ElementHotspot::new(index, witness.location))
                    .collect(),
                Element::Line(line) => {
                    let mid = Point2::from_vec((line.start.as_vec2() + line.end.as_vec2()) * 0.5);
                    vec![
                        ElementHotspot::new(1, line.start),
                        ElementHotspot::new(2, line.end),
                        ElementHotspot::new(3, mid),
                    ]
                }
                Element::Polyline(polyline) => polyline
                    .vertices
                    .iter()
                    .zip(1u32..)
                    .map(|(vertex, index)| ElementHotspot::new(index, *vertex))
                    .collect(),
                Element::Circle(circle) => {
                    let c = circle.center;
                    let r = circle.radius.abs();
                    vec![
                        ElementHotspot::new(0, c),
                        ElementHotspot::new(1, Point2::new(c.x() + r, c.y())),
                        ElementHotspot::new(2, Point2::new(c.x(), c.y() + r)),
                        ElementHotspot::new(3, Point2::new(c.x() - r, c.y())),
                        ElementHotspot::new(4, Point2::new(c.x(), c.y() - r)),
                    ]
                }
            }
        }

        /// 点到元素几何的最短距离，用于按坐标查找元素。
        pub fn distance_to(&self, point: Point2) -> f64 {
            match self {
                Element::Hotspot(hotspot) => point.distance_to(hotspot.position),
                Element::LinearDimension(dimension) => {
                    match (dimension.witness_position(0), dimension.witness_position(1)) {
                        (Some(start), Some(end)) => point.distance_to_segment(start, end),
                        _ => f64::INFINITY,
                    }
                }
                Element::Line(line) => point.distance_to_segment(line.start, line.end),
                Element::Polyline(polyline) => match polyline.vertices.as_slice() {
                    [] => f64::INFINITY,
                    [single] => point.distance_to(*single),
                    _ => polyline
                        .segments()
                        .map(|(start, end)| point.distance_to_segment(start, end))
                        .fold(f64::INFINITY, f64::min),
                },
                Element::Circle(circle) => {
                    (point.distance_to(circle.center) - circle.radius.abs()).abs()
                }
            }
        }
    }

    #[derive(Debug, Clone, Default)]
    struct DocumentState {
        layers: HashMap<String, Layer>,
        elements: Vec<(ElementGuid, Element)>,
        dimension_defaults: DimensionStyle,
    }

    #[derive(Debug, Clone)]
    struct UndoStep {
        name: String,
        before: DocumentState,
    }

    /// 内存中的宿主文档。所有通过 [`ElementStore`] 的修改都必须位于
    /// 一个具名的可撤销事务中；事务失败时整体回滚。
    #[derive(Debug, Clone)]
    pub struct Document {
        state: DocumentState,
        hotspot_layer: String,
        history: VecDeque<UndoStep>,
        undo_depth: usize,
        open_transaction: Option<UndoStep>,
    }

    impl Default for Document {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Document {
        pub fn new() -> Self {
            Self::with_undo_depth(DEFAULT_UNDO_DEPTH)
        }

        pub fn with_undo_depth(undo_depth: usize) -> Self {
            let mut doc = Self {
                state: DocumentState::default(),
                hotspot_layer: DEFAULT_HOTSPOT_LAYER.to_string(),
                history: VecDeque::new(),
                undo_depth,
                open_transaction: None,
            };
            doc.ensure_layer("0");
            doc
        }

        pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
            let key = name.as_ref();
            self.state
                .layers
                .entry(key.to_string())
                .or_insert_with(|| Layer::new(key));
        }

        /// 设置新建热点所在图层。
        pub fn set_hotspot_layer(&mut self, layer: impl Into<String>) {
            self.hotspot_layer = layer.into();
        }

        #[inline]
        pub fn hotspot_layer(&self) -> &str {
            &self.hotspot_layer
        }

        /// 设置“上次使用的标注样式”，之后新建的标注都会继承它。
        pub fn set_dimension_defaults(&mut self, style: DimensionStyle) {
            self.state.dimension_defaults = style;
        }

        #[inline]
        pub fn dimension_defaults(&self) -> &DimensionStyle {
            &self.state.dimension_defaults
        }

        pub fn add_line(&mut self, start: Point2, end: Point2, layer: impl Into<String>) -> ElementGuid {
            let layer = layer.into();
            self.insert(Element::Line(Line { start, end, layer }))
        }

        pub fn add_polyline<I>(&mut self, vertices: I, is_closed: bool, layer: impl Into<String>) -> ElementGuid
        where
            I: IntoIterator<Item = Point2>,
        {
            let layer = layer.into();
            self.insert(Element::Polyline(Polyline {
                vertices: vertices.into_iter().collect(),
                is_closed,
                layer,
            }))
        }

        pub fn add_circle(&mut self, center: Point2, radius: f64, layer: impl Into<String>) -> ElementGuid {
            let layer = layer.into();
            self.insert(Element::Circle(Circle {
                center,
                radius,
                layer,
            }))
        }

        pub fn layers(&self) -> impl Iterator<Item = &Layer> {
            self.state.layers.values()
        }

        pub fn len(&self) -> usize {
            self.state.elements.len()
        }

        pub fn is_empty(&self) -> bool {
            self.state.elements.is_empty()
        }

        pub fn get(&self, guid: ElementGuid) -> Option<&Element> {
            self.state
                .elements
                .iter()
                .find(|(id, _)| *id == guid)
                .map(|(_, element)| element)
        }

        pub fn count_of_kind(&self, kind: ElementKind) -> usize {
            self.state
                .elements
                .iter()
                .filter(|(_, element)| element.kind() == kind)
                .count()
        }

        #[inline]
        pub fn in_transaction(&self) -> bool {
            self.open_transaction.is_some()
        }

        /// 撤销最近一次已提交的事务，返回其名称。事务进行中不可撤销。
        pub fn undo(&mut self) -> Option<String> {
            if self.open_transaction.is_some() {
                return None;
            }
            let step = self.history.pop_back()?;
            self.state = step.before;
            Some(step.name)
        }

        /// 已提交事务的名称，按时间先后排列。
        pub fn transaction_names(&self) -> impl Iterator<Item = &str> {
            self.history.iter().map(|step| step.name.as_str())
        }

        fn insert(&mut self, element: Element) -> ElementGuid {
            self.ensure_layer(element.layer_name().to_string());
            let guid = ElementGuid::new();
            self.state.elements.push((guid, element));
            guid
        }

        fn position_of(&self, guid: ElementGuid) -> Option<usize> {
            self.state.elements.iter().position(|(id, _)| *id == guid)
        }

        fn require_transaction(&self, operation: &'static str) -> Result<(), StoreError> {
            if self.open_transaction.is_some() {
                Ok(())
            } else {
                Err(StoreError::OutsideTransaction { operation })
            }
        }

        /// 被关联元素移动后，刷新所有关联到它的标注端点。
        fn refresh_anchored(&mut self, guid: ElementGuid) {
            let Some(hotspots) = self.get(guid).map(Element::hotspots) else {
                return;
            };
            for (_, element) in &mut self.state.elements {
                let Element::LinearDimension(dimension) = element else {
                    continue;
                };
                for witness in &mut dimension.witnesses {
                    let Some(anchor) = witness.anchor else {
                        continue;
                    };
                    if anchor.element != guid {
                        continue;
                    }
                    if let Some(hotspot) = hotspots
                        .iter()
                        .find(|hotspot| hotspot.index == anchor.hotspot_index)
                    {
                        witness.location = hotspot.position;
                    }
                }
            }
        }

        /// 被关联元素删除后，相关端点保留最后坐标并退化为自由点。
        fn detach_anchored(&mut self, guid: ElementGuid) {
            for (_, element) in &mut self.state.elements {
                if let Element::LinearDimension(dimension) = element {
                    for witness in &mut dimension.witnesses {
                        if witness.anchor.is_some_and(|anchor| anchor.element == guid) {
                            witness.anchor = None;
                        }
                    }
                }
            }
        }

        fn remove(&mut self, guid: ElementGuid) -> bool {
            match self.position_of(guid) {
                Some(index) => {
                    self.state.elements.remove(index);
                    self.detach_anchored(guid);
                    true
                }
                None => false,
            }
        }

        fn validate_anchor(&self, anchor: &DimensionAnchor) -> Result<(), StoreError> {
            let element = self.get(anchor.element).ok_or_else(|| StoreError::Rejected {
                operation: "create_linear_dimension",
                reason: format!("anchor element {} does not exist", anchor.element),
            })?;
            let attachable = element
                .hotspots()
                .iter()
                .any(|hotspot| hotspot.index == anchor.hotspot_index);
            if attachable {
                Ok(())
            } else {
                Err(StoreError::Rejected {
                    operation: "create_linear_dimension",
                    reason: format!(
                        "{} {} has no hotspot #{}",
                        element.kind(),
                        anchor.element,
                        anchor.hotspot_index
                    ),
                })
            }
        }
    }

    impl ElementStore for Document {
        fn element(&self, guid: ElementGuid) -> Result<&Element, StoreError> {
            self.get(guid).ok_or(StoreError::NotFound(guid))
        }

        fn element_hotspots(&self, guid: ElementGuid) -> Result<Vec<ElementHotspot>, StoreError> {
            self.element(guid).map(Element::hotspots)
        }

        fn elements_near(&self, point: Point2, radius: f64) -> Vec<ElementGuid> {
            let mut hits: Vec<(ElementGuid, f64)> = self
                .state
                .elements
                .iter()
                .map(|(guid, element)| (*guid, element.distance_to(point)))
                .filter(|(_, dist)| *dist <= radius)
                .collect();
            hits.sort_by(|a, b| a.1.total_cmp(&b.1));
            hits.into_iter().map(|(guid, _)| guid).collect()
        }

        fn elements_of_kind(&self, kind: ElementKind) -> Vec<ElementGuid> {
            self.state
                .elements
                .iter()
                .filter(|(_, element)| element.kind() == kind)
                .map(|(guid, _)| *guid)
                .collect()
        }

        fn create_hotspot(&mut self, position: Point2) -> Result<ElementGuid, StoreError> {
            self.require_transaction("create_hotspot")?;
            let layer = self.hotspot_layer.clone();
            Ok(self.insert(Element::Hotspot(Hotspot { position, layer })))
        }

        fn create_linear_dimension(&mut self, geometry: DimensionGeometry) -> Result<ElementGuid, StoreError> {
            self.require_transaction("create_linear_dimension")?;
            if geometry.direction.length() <= f64::EPSILON {
                return Err(StoreError::Rejected {
                    operation: "create_linear_dimension",
                    reason: "dimension direction is degenerate".to_string(),
                });
            }
            for anchor in geometry.witnesses.iter().filter_map(|witness| witness.anchor.as_ref()) {
                self.validate_anchor(anchor)?;
            }
            let style = self.state.dimension_defaults.clone();
            Ok(self.insert(Element::LinearDimension(LinearDimension {
                reference: geometry.reference,
                direction: geometry.direction,
                witnesses: geometry.witnesses,
                style,
            })))
        }

        fn move_hotspot(&mut self, guid: ElementGuid, position: Point2) -> Result<(), StoreError> {
            self.require_transaction("move_hotspot")?;
            let index = self.position_of(guid).ok_or(StoreError::NotFound(guid))?;
            match &mut self.state.elements[index].1 {
                Element::Hotspot(hotspot) => hotspot.position = position,
                other => {
                    return Err(StoreError::WrongKind {
                        guid,
                        expected: ElementKind::Hotspot,
                        found: other.kind(),
                    });
                }
            }
            self.refresh_anchored(guid);
            Ok(())
        }

        fn delete_element(&mut self, guid: ElementGuid) -> Result<(), StoreError> {
            self.require_transaction("delete_element")?;
            if self.remove(guid) {
                Ok(())
            } else {
                Err(StoreError::NotFound(guid))
            }
        }

        fn delete_elements(&mut self, guids: &[ElementGuid]) -> Result<usize, StoreError> {
            self.require_transaction("delete_elements")?;
            Ok(guids.iter().filter(|guid| self.remove(**guid)).count())
        }

        fn begin_transaction(&mut self, name: &str) -> Result<(), StoreError> {
            if let Some(open) = &self.open_transaction {
                return Err(StoreError::TransactionActive {
                    active: open.name.clone(),
                });
            }
            self.open_transaction = Some(UndoStep {
                name: name.to_string(),
                before: self.state.clone(),
            });
            Ok(())
        }

        fn commit_transaction(&mut self) {
            let Some(step) = self.open_transaction.take() else {
                return;
            };
            if self.undo_depth == 0 {
                return;
            }
            self.history.push_back(step);
            while self.history.len() > self.undo_depth {
                self.history.pop_front();
            }
        }

        fn rollback_transaction(&mut self) {
            if let Some(step) = self.open_transaction.take() {
                self.state = step.before;
            }
        }
    }

}

pub mod store {
    use thiserror::Error;

    use crate::document::{DimensionGeometry, Element, ElementGuid, ElementHotspot, ElementKind};
    use crate::geometry::Point2;

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum StoreError {
        #[error("element {0} not found")]
        NotFound(ElementGuid),
        #[error("element {guid} is a {found}, expected a {expected}")]
        WrongKind {
            guid: ElementGuid,
            expected: ElementKind,
            found: ElementKind,
        },
        #[error("{operation} must run inside an undoable transaction")]
        OutsideTransaction { operation: &'static str },
        #[error("transaction {active:?} is still open")]
        TransactionActive { active: String },
        #[error("{operation} rejected: {reason}")]
        Rejected {
            operation: &'static str,
            reason: String,
        },
    }

    impl StoreError {
        /// 是否表示元素已确认不存在。只有这种情况才允许清理登记表中的过期映射。
        #[inline]
        pub fn is_not_found(&self) -> bool {
            matches!(self, StoreError::NotFound(_))
        }
    }

    /// 宿主文档对外暴露的元素操作：读取、创建、修改、删除、按坐标查找，
    /// 以及具名的可撤销事务。
    pub trait ElementStore {
        fn element(&self, guid: ElementGuid) -> Result<&Element, StoreError>;

        fn element_hotspots(&self, guid: ElementGuid) -> Result<Vec<ElementHotspot>, StoreError>;

        /// 与 `point` 距离不超过 `radius` 的元素，由近到远。
        fn elements_near(&self, point: Point2, radius: f64) -> Vec<ElementGuid>;

        /// 指定类型的全部元素，按创建顺序。
        fn elements_of_kind(&self, kind: ElementKind) -> Vec<ElementGuid>;

        fn create_hotspot(&mut self, position: Point2) -> Result<ElementGuid, StoreError>;

        /// 创建线性标注，非几何属性取自文档当前的默认标注样式。
        fn create_linear_dimension(&mut self, geometry: DimensionGeometry) -> Result<ElementGuid, StoreError>;

        fn move_hotspot(&mut self, guid: ElementGuid, position: Point2) -> Result<(), StoreError>;

        fn delete_element(&mut self, guid: ElementGuid) -> Result<(), StoreError>;

        /// 批量删除，返回实际删除的数量。默认实现逐个删除并跳过已不存在的元素。
        fn delete_elements(&mut self, guids: &[ElementGuid]) -> Result<usize, StoreError> {
            let mut deleted = 0;
            for guid in guids {
                match self.delete_element(*guid) {
                    Ok(()) => deleted += 1,
                    Err(StoreError::NotFound(_)) => {}
                    Err(err) => return Err(err),
                }
            }
            Ok(deleted)
        }

        fn begin_transaction(&mut self, name: &str) -> Result<(), StoreError>;

        fn commit_transaction(&mut self);

        fn rollback_transaction(&mut self);

        /// 以单个具名可撤销事务执行 `op`；`op` 失败时回滚其中的全部修改。
        fn undoable<T, F>(&mut self, name: &str, op: F) -> Result<T, StoreError>
        where
            Self: Sized,
            F: FnOnce(&mut Self) -> Result<T, StoreError>,
        {
            self.begin_transaction(name)?;
            match op(self) {
                Ok(value) => {
                    self.commit_transaction();
                    Ok(value)
                }
                Err(err) => {
                    self.rollback_transaction();
                    Err(err)
                }
            }
        }
    }
}
