mod app;

use app::{app_router, AppState, RateLimiter};
use dotenvy::dotenv;
use markpad_core::{AccessPolicy, InstanceCoordinator, LockGuard, NoteStore};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 优雅关闭的排空宽限期：超时即强制退出，绝不无限挂起。
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct ApiConfig {
    host: String,
    /// 首选端口；被占用时从这里向后逐个尝试
    preferred_port: u16,
    port_attempts: u16,
    /// 逗号分隔的允许目录列表（必填）
    allowed_dirs: String,
    allowed_extensions: String,
    max_file_size: u64,
    static_dir: PathBuf,
    lock_file: PathBuf,
    /// CORS 允许的来源列表（空则允许所有）
    cors_origins: Vec<String>,
    rate_limit: usize,
    rate_window: Duration,
}

impl ApiConfig {
    fn from_env() -> Self {
        let host = env::var("MP_HOST").unwrap_or_else(|_| "127.0.0.1".into());

        let preferred_port = env::var("MP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3001);

        let port_attempts = env::var("MP_PORT_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        // 允许目录列表为空时在策略构建阶段致命退出
        let allowed_dirs = env::var("MP_ALLOWED_DIRS").unwrap_or_default();

        let allowed_extensions =
            env::var("MP_ALLOWED_EXTENSIONS").unwrap_or_else(|_| "md,markdown,txt".into());

        let max_file_size = env::var("MP_MAX_FILE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10 * 1024 * 1024);

        let static_dir = env::var("MP_STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./static"));

        let lock_file = env::var("MP_LOCK_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./markpad.lock"));

        // CORS 允许的来源，逗号分隔；空或 "*" 表示允许所有
        let cors_origins = env::var("MP_CORS_ORIGINS")
            .ok()
            .map(|s| {
                let trimmed = s.trim();
                if trimmed.is_empty() || trimmed == "*" {
                    vec![]
                } else {
                    trimmed
                        .split(',')
                        .filter(|t| !t.trim().is_empty())
                        .map(|t| t.trim().to_string())
                        .collect()
                }
            })
            .unwrap_or_default();

        let rate_limit = env::var("MP_RATE_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(120);
        let rate_window = env::var("MP_RATE_WINDOW_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(60));

        Self {
            host,
            preferred_port,
            port_attempts,
            allowed_dirs,
            allowed_extensions,
            max_file_size,
            static_dir,
            lock_file,
            cors_origins,
            rate_limit,
            rate_window,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 优先读取 .env（若存在）
    let _ = dotenv();
    init_tracing();

    let config = ApiConfig::from_env();

    // 策略在启动时构建一次；目录列表为空是致命配置错误（退出码 1）
    let policy = Arc::new(AccessPolicy::from_config(
        &config.allowed_dirs,
        &config.allowed_extensions,
        config.max_file_size,
    )?);
    info!(
        dirs = policy.allowed_dirs().len(),
        max_file_size = policy.max_file_size(),
        "access policy loaded"
    );

    // 单实例协调：锁冲突 / 端口耗尽都是致命启动错误，不重试
    let coordinator = InstanceCoordinator::new(&config.lock_file);
    let (listener, guard) = coordinator
        .acquire(&config.host, config.preferred_port, config.port_attempts)
        .await?;
    let guard = Arc::new(guard);
    info!("listening on {}:{}", config.host, guard.port());

    let store = Arc::new(NoteStore::new(policy));
    let limiter = Arc::new(RateLimiter::new(config.rate_limit, config.rate_window));
    let state = AppState { store, limiter };

    let app = app_router(state, config.cors_origins.clone(), &config.static_dir);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(guard.clone()))
    .await?;

    guard.release();
    info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// 等待 SIGINT/SIGTERM，触发优雅关闭；同时启动排空看门狗。
async fn shutdown_signal(lock: Arc<LockGuard>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining connections");

    // 宽限期内没排空就释放锁并强制退出
    tokio::spawn(async move {
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        tracing::warn!("drain grace period expired, forcing exit");
        lock.release();
        std::process::exit(0);
    });
}
