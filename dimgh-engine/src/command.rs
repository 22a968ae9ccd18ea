use std::collections::HashMap;

use dimgh_core::document::ElementGuid;
use dimgh_core::geometry::Point2;
use dimgh_core::store::ElementStore;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::attachment::EndpointRef;
use crate::builder::DimensionRequest;
use crate::errors::EngineError;
use crate::session::Session;

/// 命令执行失败时的错误码。每个命令只使用其中与自身相关的部分。
pub mod codes {
    /// 缺少必填字段、字段格式错误或命令未知。
    pub const INVALID_REQUEST: i32 = -1;
    /// 几何退化（两点重合）。
    pub const DEGENERATE_GEOMETRY: i32 = -2;
    /// 文档拒绝创建元素。
    pub const CREATE_FAILED: i32 = -3;
    /// 文档拒绝读取、修改或删除。
    pub const STORE_FAILED: i32 = -4;
    /// 引用的热点已不存在。
    pub const NOT_FOUND: i32 = -5;
}

pub const PING_MESSAGE: &str = "Dimension_Gh alive";

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub parameters: Value,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandFailure {
    pub code: i32,
    pub message: String,
}

/// 命令结果：`success`、可选的 `error` 以及命令相关的附加字段。
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResponse {
    pub success: bool,
    pub error: Option<CommandFailure>,
    pub fields: Map<String, Value>,
}

impl CommandResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            fields: Map::new(),
        }
    }

    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(CommandFailure {
                code,
                message: message.into(),
            }),
            fields: Map::new(),
        }
    }

    pub fn from_error(err: &EngineError) -> Self {
        Self::failure(error_code(err), err.to_string())
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert("success".to_string(), Value::Bool(self.success));
        if let Some(error) = &self.error {
            object.insert(
                "error".to_string(),
                json!({ "code": error.code, "message": error.message }),
            );
        }
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

pub fn error_code(err: &EngineError) -> i32 {
    match err {
        EngineError::MissingField(_)
        | EngineError::InvalidField { .. }
        | EngineError::InvalidParameters(_) => codes::INVALID_REQUEST,
        EngineError::PointsTooClose => codes::DEGENERATE_GEOMETRY,
        EngineError::CreateFailed { .. } => codes::CREATE_FAILED,
        EngineError::Store(_) => codes::STORE_FAILED,
        EngineError::HotspotNotFound(_) => codes::NOT_FOUND,
    }
}

pub trait CommandHandler<S: ElementStore>: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(&self, request: &CommandRequest, context: &mut CommandContext<'_, S>) -> CommandResponse;
}

pub struct CommandContext<'a, S> {
    pub session: &'a mut Session,
    pub store: &'a mut S,
}

pub struct CommandBus<S: ElementStore + 'static> {
    handlers: HashMap<&'static str, Box<dyn CommandHandler<S>>>,
}

impl<S: ElementStore + 'static> CommandBus<S> {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(PingCommand);
        bus.register(GetDimensionsCommand);
        bus.register(CreateHotspotCommand);
        bus.register(UpdateHotspotCommand);
        bus.register(DeleteHotspotCommand);
        bus.register(DeleteAllHotspotsCommand);
        bus.register(CreateLinearDimensionCommand);
        bus
    }

    pub fn register<H: CommandHandler<S> + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    #[inline]
    pub fn handles(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn dispatch(&self, request: &CommandRequest, context: &mut CommandContext<'_, S>) -> CommandResponse {
        let Some(handler) = self.handlers.get(request.name.as_str()) else {
            return CommandResponse::failure(
                codes::INVALID_REQUEST,
                format!("Unknown command: {}", request.name),
            );
        };
        debug!(command = %request.name, "执行命令");
        let response = handler.execute(request, context);
        if let Some(error) = &response.error {
            warn!(command = %request.name, code = error.code, message = %error.message, "命令执行失败");
        }
        response
    }

    /// 已注册命令名，按字母排序。
    pub fn available_commands(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl<S: ElementStore + 'static> Default for CommandBus<S> {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_params<P: DeserializeOwned + Default>(parameters: &Value) -> Result<P, EngineError> {
    if parameters.is_null() {
        return Ok(P::default());
    }
    P::deserialize(parameters).map_err(|err| EngineError::InvalidParameters(err.to_string()))
}

fn require<T>(value: Option<T>, field: &'static str) -> Result<T, EngineError> {
    value.ok_or(EngineError::MissingField(field))
}

/// 空字符串视同未提供。
fn optional_guid(value: Option<&str>, field: &'static str) -> Result<Option<ElementGuid>, EngineError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse::<ElementGuid>()
            .map(Some)
            .map_err(|err| EngineError::InvalidField {
                field,
                reason: format!("{err}"),
            }),
    }
}

fn required_guid(value: Option<&str>, field: &'static str) -> Result<ElementGuid, EngineError> {
    require(optional_guid(value, field)?, field)
}

#[derive(Debug, Default, Deserialize)]
struct PointParam {
    x: Option<f64>,
    y: Option<f64>,
}

impl PointParam {
    fn to_point(&self, x_field: &'static str, y_field: &'static str) -> Result<Point2, EngineError> {
        Ok(Point2::new(require(self.x, x_field)?, require(self.y, y_field)?))
    }
}

struct PingCommand;

impl<S: ElementStore> CommandHandler<S> for PingCommand {
    fn name(&self) -> &'static str {
        "Ping"
    }

    fn execute(&self, _request: &CommandRequest, _context: &mut CommandContext<'_, S>) -> CommandResponse {
        CommandResponse::ok().with("message", PING_MESSAGE)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetDimensionsParams {
    filter_layer: Option<String>,
}

struct GetDimensionsCommand;

impl<S: ElementStore> CommandHandler<S> for GetDimensionsCommand {
    fn name(&self) -> &'static str {
        "GetDimensions"
    }

    fn execute(&self, request: &CommandRequest, context: &mut CommandContext<'_, S>) -> CommandResponse {
        let params: GetDimensionsParams = match parse_params(&request.parameters) {
            Ok(params) => params,
            Err(err) => return CommandResponse::from_error(&err),
        };
        let filter = params.filter_layer.as_deref().filter(|layer| !layer.is_empty());
        let dimensions: Vec<Value> = context
            .session
            .list_dimensions(&*context.store, filter)
            .into_iter()
            .map(|summary| {
                let points: Vec<Value> = summary
                    .points
                    .iter()
                    .map(|point| json!({ "x": point.x(), "y": point.y(), "z": 0.0 }))
                    .collect();
                json!({
                    "guid": summary.guid.to_string(),
                    "type": "linear",
                    "layer": summary.layer,
                    "text": summary.text,
                    "style": summary.style,
                    "points": points,
                })
            })
            .collect();
        CommandResponse::ok().with("dimensions", dimensions)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateHotspotParams {
    x: Option<f64>,
    y: Option<f64>,
    rhino_point_guid: Option<String>,
}

struct CreateHotspotCommand;

impl CreateHotspotCommand {
    fn run<S: ElementStore>(
        request: &CommandRequest,
        context: &mut CommandContext<'_, S>,
    ) -> Result<CommandResponse, EngineError> {
        let params: CreateHotspotParams = parse_params(&request.parameters)?;
        let position = Point2::new(require(params.x, "x")?, require(params.y, "y")?);
        let correlation = params
            .rhino_point_guid
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let outcome = context
            .session
            .create_hotspot(context.store, position, correlation)?;

        let mut response = CommandResponse::ok()
            .with("hotspotGuid", outcome.marker.guid.to_string())
            .with("created", outcome.created);
        if let Some(element) = outcome.element {
            response = response.with("elementGuid", element.to_string());
        }
        if let Some(id) = correlation {
            response = response.with("rhinoPointGuid", id);
        }
        Ok(response)
    }
}

impl<S: ElementStore> CommandHandler<S> for CreateHotspotCommand {
    fn name(&self) -> &'static str {
        "CreateHotspot"
    }

    fn execute(&self, request: &CommandRequest, context: &mut CommandContext<'_, S>) -> CommandResponse {
        Self::run(request, context).unwrap_or_else(|err| CommandResponse::from_error(&err))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateHotspotParams {
    hotspot_guid: Option<String>,
    x: Option<f64>,
    y: Option<f64>,
}

struct UpdateHotspotCommand;

impl UpdateHotspotCommand {
    fn run<S: ElementStore>(
        request: &CommandRequest,
        context: &mut CommandContext<'_, S>,
    ) -> Result<CommandResponse, EngineError> {
        let params: UpdateHotspotParams = parse_params(&request.parameters)?;
        let guid = required_guid(params.hotspot_guid.as_deref(), "hotspotGuid")?;
        let position = Point2::new(require(params.x, "x")?, require(params.y, "y")?);
        let marker = context.session.update_hotspot(context.store, guid, position)?;
        Ok(CommandResponse::ok().with("hotspotGuid", marker.guid.to_string()))
    }
}

impl<S: ElementStore> CommandHandler<S> for UpdateHotspotCommand {
    fn name(&self) -> &'static str {
        "UpdateHotspot"
    }

    fn execute(&self, request: &CommandRequest, context: &mut CommandContext<'_, S>) -> CommandResponse {
        Self::run(request, context).unwrap_or_else(|err| CommandResponse::from_error(&err))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteHotspotParams {
    hotspot_guid: Option<String>,
}

struct DeleteHotspotCommand;

impl<S: ElementStore> CommandHandler<S> for DeleteHotspotCommand {
    fn name(&self) -> &'static str {
        "DeleteHotspot"
    }

    fn execute(&self, request: &CommandRequest, context: &mut CommandContext<'_, S>) -> CommandResponse {
        let result = parse_params::<DeleteHotspotParams>(&request.parameters)
            .and_then(|params| required_guid(params.hotspot_guid.as_deref(), "hotspotGuid"))
            .and_then(|guid| context.session.delete_hotspot(context.store, guid));
        match result {
            Ok(deleted) => CommandResponse::ok().with("deleted", deleted),
            Err(err) => CommandResponse::from_error(&err),
        }
    }
}

struct DeleteAllHotspotsCommand;

impl<S: ElementStore> CommandHandler<S> for DeleteAllHotspotsCommand {
    fn name(&self) -> &'static str {
        "DeleteAllHotspots"
    }

    fn execute(&self, _request: &CommandRequest, context: &mut CommandContext<'_, S>) -> CommandResponse {
        let deleted = context.session.delete_all_hotspots(context.store);
        CommandResponse::ok().with("deletedCount", deleted)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLinearDimensionParams {
    point1: Option<PointParam>,
    point2: Option<PointParam>,
    hotspot_guid1: Option<String>,
    hotspot_guid2: Option<String>,
    element_guid1: Option<String>,
    element_guid2: Option<String>,
    offset: Option<f64>,
}

struct CreateLinearDimensionCommand;

impl CreateLinearDimensionCommand {
    fn run<S: ElementStore>(
        request: &CommandRequest,
        context: &mut CommandContext<'_, S>,
    ) -> Result<CommandResponse, EngineError> {
        let params: CreateLinearDimensionParams = parse_params(&request.parameters)?;
        let pt1 = require(params.point1.as_ref(), "point1")?.to_point("point1.x", "point1.y")?;
        let pt2 = require(params.point2.as_ref(), "point2")?.to_point("point2.x", "point2.y")?;

        let start = EndpointRef::new(pt1)
            .with_hotspot(optional_guid(params.hotspot_guid1.as_deref(), "hotspotGuid1")?)
            .with_element(optional_guid(params.element_guid1.as_deref(), "elementGuid1")?);
        let end = EndpointRef::new(pt2)
            .with_hotspot(optional_guid(params.hotspot_guid2.as_deref(), "hotspotGuid2")?)
            .with_element(optional_guid(params.element_guid2.as_deref(), "elementGuid2")?);
        let dimension = DimensionRequest::new(start, end).with_offset(params.offset.unwrap_or(0.0));

        let outcome = context
            .session
            .create_linear_dimension(context.store, &dimension)?;
        Ok(CommandResponse::ok()
            .with("distance", outcome.distance)
            .with("dimensionGuid", outcome.dimension.to_string())
            .with("created", outcome.created))
    }
}

impl<S: ElementStore> CommandHandler<S> for CreateLinearDimensionCommand {
    fn name(&self) -> &'static str {
        "CreateLinearDimension"
    }

    fn execute(&self, request: &CommandRequest, context: &mut CommandContext<'_, S>) -> CommandResponse {
        Self::run(request, context).unwrap_or_else(|err| CommandResponse::from_error(&err))
    }
}
