//! JSON 桥接层：解析请求信封，交给命令总线执行，再按信封类型包装结果。
//!
//! 支持两种信封：
//! - 面板消息 `{"command": ..., "payload": {...}}`，回复 `{"ok", "error", "result"}`；
//! - 宿主命令表 `{"command": "API.ExecuteAddOnCommand", "parameters": {...}}`，
//!   回复 `{"succeeded", "result": {"addOnCommandResponse"}}` 或 `{"succeeded": false, "error"}`。

use dimgh_config::BridgeConfig;
use dimgh_core::store::ElementStore;
use dimgh_engine::command::{CommandBus, CommandContext, CommandRequest, CommandResponse};
use dimgh_engine::session::Session;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

pub use errors::BridgeError;

/// 宿主命令表转发插件命令时使用的命令名。
pub const ADD_ON_COMMAND: &str = "API.ExecuteAddOnCommand";

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum BridgeError {
        #[error("Empty request")]
        Empty,
        #[error("Invalid JSON: {0}")]
        InvalidJson(#[from] serde_json::Error),
        #[error("Missing '{0}' field")]
        MissingField(&'static str),
        #[error("Unknown command namespace: {found}")]
        UnknownNamespace { expected: String, found: String },
        #[error("Unknown command: {0}")]
        UnknownCommand(String),
    }

    impl BridgeError {
        /// 传输层错误码，与命令自身的错误码相互独立。
        pub fn code(&self) -> i32 {
            match self {
                BridgeError::Empty => -1,
                BridgeError::InvalidJson(_) => -2,
                BridgeError::MissingField(_) => -3,
                BridgeError::UnknownNamespace { .. } => -4,
                BridgeError::UnknownCommand(_) => -5,
            }
        }
    }
}

/// 持有命令总线与会话状态；文档由调用方在每次请求时传入。
pub struct Bridge<S: ElementStore + 'static> {
    bus: CommandBus<S>,
    session: Session,
    namespace: String,
    pretty: bool,
}

impl<S: ElementStore + 'static> Bridge<S> {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            bus: CommandBus::new(),
            session: Session::new(),
            namespace: config.command_namespace.clone(),
            pretty: config.pretty_responses,
        }
    }

    #[inline]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn available_commands(&self) -> Vec<&'static str> {
        self.bus.available_commands()
    }

    /// 处理一条原始 JSON 请求，返回序列化后的回复。
    pub fn handle_json(&mut self, store: &mut S, raw: &str) -> String {
        let reply = self.handle_str(store, raw);
        if self.pretty {
            format!("{reply:#}")
        } else {
            reply.to_string()
        }
    }

    pub fn handle_str(&mut self, store: &mut S, raw: &str) -> Value {
        if raw.trim().is_empty() {
            return palette_error(&BridgeError::Empty);
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(request) => self.handle_value(store, &request),
            Err(err) => palette_error(&BridgeError::from(err)),
        }
    }

    pub fn handle_value(&mut self, store: &mut S, request: &Value) -> Value {
        let command = match request
            .get("command")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            Some(command) => command,
            None => return palette_error(&BridgeError::MissingField("command")),
        };

        if command == ADD_ON_COMMAND {
            let parameters = request.get("parameters").unwrap_or(&Value::Null);
            match self.execute_add_on(store, parameters) {
                Ok(response) => json!({
                    "succeeded": true,
                    "result": { "addOnCommandResponse": response.to_value() },
                }),
                Err(err) => {
                    warn!(code = err.code(), error = %err, "宿主命令请求无效");
                    json!({
                        "succeeded": false,
                        "error": { "code": err.code(), "message": err.to_string() },
                    })
                }
            }
        } else {
            let payload = request.get("payload").cloned().unwrap_or(Value::Null);
            match self.execute(store, command, payload) {
                Ok(response) => {
                    let error = response
                        .error
                        .as_ref()
                        .map(|failure| failure.message.clone())
                        .unwrap_or_default();
                    json!({
                        "ok": response.success,
                        "error": error,
                        "result": response.to_value(),
                    })
                }
                Err(err) => palette_error(&err),
            }
        }
    }

    /// 结束会话：删除本会话创建的热点并清空标注登记，返回删除的热点数量。
    pub fn teardown(&mut self, store: &mut S) -> usize {
        self.session.teardown(store)
    }

    fn execute_add_on(&mut self, store: &mut S, parameters: &Value) -> Result<CommandResponse, BridgeError> {
        let id = parameters
            .get("addOnCommandId")
            .ok_or(BridgeError::MissingField("addOnCommandId"))?;
        let namespace = required_str(id, "commandNamespace")?;
        let name = required_str(id, "commandName")?;
        if namespace != self.namespace {
            return Err(BridgeError::UnknownNamespace {
                expected: self.namespace.clone(),
                found: namespace.to_string(),
            });
        }
        let arguments = parameters
            .get("addOnCommandParameters")
            .cloned()
            .unwrap_or(Value::Null);
        self.execute(store, name, arguments)
    }

    fn execute(&mut self, store: &mut S, name: &str, parameters: Value) -> Result<CommandResponse, BridgeError> {
        if !self.bus.handles(name) {
            return Err(BridgeError::UnknownCommand(name.to_string()));
        }
        let request = CommandRequest::new(name, parameters);
        let mut context = CommandContext {
            session: &mut self.session,
            store,
        };
        let response = self.bus.dispatch(&request, &mut context);
        if response.success {
            debug!(command = name, "命令执行成功");
        } else {
            info!(command = name, "命令返回错误");
        }
        Ok(response)
    }
}

fn required_str<'a>(object: &'a Value, field: &'static str) -> Result<&'a str, BridgeError> {
    object
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or(BridgeError::MissingField(field))
}

fn palette_error(err: &BridgeError) -> Value {
    warn!(code = err.code(), error = %err, "请求无法处理");
    let mut reply = Map::new();
    reply.insert("ok".to_string(), Value::Bool(false));
    reply.insert("error".to_string(), Value::String(err.to_string()));
    reply.insert("result".to_string(), Value::Object(Map::new()));
    Value::Object(reply)
}
