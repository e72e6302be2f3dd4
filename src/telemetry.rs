//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了日志输出和链路追踪的初始化。

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// 初始化日志与 OpenTelemetry Tracing
///
/// 应在进程启动时调用一次。`RUST_LOG` 存在时优先于 `default_filter`。
/// 未配置导出器时 tracer provider 不导出任何数据，span 仍然会在
/// 控制台日志中体现。
///
/// # 参数
///
/// * `service_name` - 服务名称
/// * `default_filter` - 默认的 `EnvFilter` 指令
pub fn init_tracing(service_name: &str, default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let provider = SdkTracerProvider::builder().build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(service_name.to_string());
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    let subscriber = Registry::default()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(telemetry);

    // 已有全局 subscriber 时（例如测试中）保持原样
    let _ = tracing::subscriber::set_global_default(subscriber);
}
