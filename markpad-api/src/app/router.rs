use std::path::Path;

use axum::http::{header, HeaderValue, Method};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::handlers::{get_note, health, list_notes, save_note};
use super::middleware::{rate_limit_middleware, security_headers};
use super::state::AppState;

/// 根据配置的来源列表构建 CorsLayer
fn build_cors_layer(cors_origins: Vec<String>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if cors_origins.is_empty() {
        // 本地单用户工具默认只在回环地址上监听，未配置时允许所有来源
        base.allow_origin(AllowOrigin::any())
    } else {
        let origins: Vec<HeaderValue> = cors_origins
            .into_iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        base.allow_origin(origins)
    }
}

/// Build the router with routes and middleware wired.
pub fn app_router(state: AppState, cors_origins: Vec<String>, static_dir: &Path) -> Router {
    // 文件端点：读/写必须先过准入检查（在 NoteStore 内部强制）
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/api/files", get(list_notes))
        .route("/api/file", get(get_note).put(save_note));

    // 浏览器编辑器的静态资源兜底
    let static_service = ServeDir::new(static_dir).append_index_html_on_directories(true);

    Router::new()
        .merge(api_routes)
        .fallback_service(static_service)
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(from_fn(security_headers))
        .layer(build_cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
