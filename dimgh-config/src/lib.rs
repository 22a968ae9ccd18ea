use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 指定配置文件路径的环境变量。
pub const CONFIG_ENV_VAR: &str = "DIMGH_CONFIG";

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub document: DocumentConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 自动发现配置文件：优先读取环境变量 `DIMGH_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV_VAR) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// 检查取值是否可用：命名空间与图层名不能为空。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("bridge.command_namespace", &self.bridge.command_namespace),
            ("document.dimension_layer", &self.document.dimension_layer),
            ("document.hotspot_layer", &self.document.hotspot_layer),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "不能为空".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// JSON 桥接层配置。
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// 宿主命令表中本插件的命名空间。
    #[serde(default = "BridgeConfig::default_namespace")]
    pub command_namespace: String,
    #[serde(default)]
    pub pretty_responses: bool,
}

impl BridgeConfig {
    fn default_namespace() -> String {
        "DimensionGh".to_string()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command_namespace: Self::default_namespace(),
            pretty_responses: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentConfig {
    #[serde(default = "DocumentConfig::default_undo_depth")]
    pub undo_depth: usize,
    #[serde(default = "DocumentConfig::default_dimension_layer")]
    pub dimension_layer: String,
    #[serde(default = "DocumentConfig::default_hotspot_layer")]
    pub hotspot_layer: String,
}

impl DocumentConfig {
    fn default_undo_depth() -> usize {
        64
    }

    fn default_dimension_layer() -> String {
        "Dimensions".to_string()
    }

    fn default_hotspot_layer() -> String {
        "Hotspots".to_string()
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            undo_depth: Self::default_undo_depth(),
            dimension_layer: Self::default_dimension_layer(),
            hotspot_layer: Self::default_hotspot_layer(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置项 {key} 无效: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
