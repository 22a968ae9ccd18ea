use std::io;
use std::path::PathBuf;

use dimgh_bridge::Bridge;
use dimgh_config::{AppConfig, ConfigError, DocumentConfig};
use dimgh_core::document::Document;
use dimgh_core::geometry::Point2;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod request_loop;

fn main() {
    let mut args = std::env::args().skip(1);
    let mut config_override: Option<PathBuf> = None;
    let mut demo = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--demo" => demo = true,
            "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("`--config` 需要提供配置文件路径");
                    std::process::exit(1);
                };
                config_override = Some(PathBuf::from(path));
            }
            other => {
                eprintln!("未知参数：{other}");
                std::process::exit(1);
            }
        }
    }

    let config = load_configuration(config_override);
    init_logging(&config);

    let mut store = build_document(&config.document);
    if demo {
        seed_demo(&mut store);
    }
    let mut bridge = Bridge::new(&config.bridge);
    info!(
        namespace = bridge.namespace(),
        commands = ?bridge.available_commands(),
        "启动 Dimension_Gh 桥接服务"
    );

    let stdin = io::stdin();
    let stdout = io::stdout();
    if let Err(err) = request_loop::run(&mut bridge, &mut store, stdin.lock(), stdout.lock()) {
        error!(error = %err, "请求循环异常结束");
        bridge.teardown(&mut store);
        std::process::exit(1);
    }
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Invalid { .. } | ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

/// 日志写到 stderr，stdout 只用于回复。
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}

fn build_document(config: &DocumentConfig) -> Document {
    let mut document = Document::with_undo_depth(config.undo_depth);
    document.set_hotspot_layer(config.hotspot_layer.clone());
    let mut style = document.dimension_defaults().clone();
    style.layer = config.dimension_layer.clone();
    document.set_dimension_defaults(style);
    document.ensure_layer(&config.hotspot_layer);
    document.ensure_layer(&config.dimension_layer);
    document
}

/// 填充一组示例几何，便于手工测试元素吸附。
fn seed_demo(document: &mut Document) {
    let wall = document.add_line(Point2::new(0.0, 0.0), Point2::new(100.0, 0.0), "WALLS");
    let outline = document.add_polyline(
        [
            Point2::new(0.0, 20.0),
            Point2::new(40.0, 20.0),
            Point2::new(40.0, 50.0),
            Point2::new(0.0, 50.0),
        ],
        true,
        "ROOMS",
    );
    let column = document.add_circle(Point2::new(70.0, 35.0), 5.0, "COLUMNS");
    info!(wall = %wall, outline = %outline, column = %column, "已创建演示几何");
}
