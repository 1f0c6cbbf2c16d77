#![allow(non_snake_case)]

mod hooks;
mod ui;

use dioxus::prelude::*;
use dioxus_router::prelude::*;
use once_cell::sync::OnceCell;
use tracing::{error, info, warn};

use hooks::playback::use_timeline_provider;
use hooks::realtime::use_realtime_provider;
use hooks::views::{use_views, use_views_provider};
use netpulse_console::api::{ClientError, DashboardClient};
use netpulse_console::config::AppConfig;
use netpulse_console::models::ViewKey;
use netpulse_console::state::DashboardSnapshot;
use ui::alerts::AlertPanel;
use ui::connection::ConnectionBadge;
use ui::notifications::NotificationCenter;
use ui::views::{ViewPanel, ViewTabs};

pub(crate) static APP_CONFIG: OnceCell<AppConfig> = OnceCell::new();
pub(crate) static API_CLIENT: OnceCell<DashboardClient> = OnceCell::new();

fn main() {
    console_error_panic_hook::set_once();
    init_logging();
    bootstrap_infrastructure();
    launch(App);
}

fn init_logging() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = dioxus_logger::init(tracing::Level::INFO);
    });
}

fn bootstrap_infrastructure() {
    let config = AppConfig::from_env();
    info!(
        api = %config.api_base_url,
        stream = %config.stream_endpoint(),
        profile = ?config.profile,
        "configuration loaded"
    );
    let _ = APP_CONFIG.set(config.clone());

    match DashboardClient::new(config) {
        Ok(client) => {
            let _ = API_CLIENT.set(client);
            info!("dashboard client initialized");
        }
        Err(err) => {
            report_client_error("初始化看板 API 客户端失败", &err);
        }
    }
}

fn report_client_error(context: &str, err: &ClientError) {
    error!(%context, ?err, status = ?err.status(), "api bootstrap error");
}

#[component]
fn App() -> Element {
    let snapshot = use_signal(DashboardSnapshot::default);
    use_context_provider(|| snapshot);

    use_realtime_provider();
    use_views_provider();
    use_timeline_provider();

    rsx! {
        div { class: "relative",
            Router::<Route> {}
            NotificationCenter {}
        }
    }
}

#[derive(Clone, Routable, Debug, PartialEq)]
pub(crate) enum Route {
    #[layout(Shell)]
    #[route("/")]
    Home {},
    #[route("/views/:view")]
    ViewPage { view: String },
}

#[component]
fn Shell() -> Element {
    let api_endpoint = APP_CONFIG
        .get()
        .map(|c| c.api_base_url.clone())
        .unwrap_or_else(|| "未配置 API 地址".to_string());

    rsx! {
        div { class: "app-shell space-y-4 p-4",
            header { class: "flex items-center justify-between rounded-lg border border-slate-200 bg-white p-4 shadow-sm",
                div {
                    h1 { class: "text-xl font-semibold text-slate-900", "NetPulse 网络运营看板" }
                    p { class: "text-sm text-slate-600", "API: {api_endpoint}" }
                }
                ConnectionBadge {}
            }
            ViewTabs {}
            div { class: "grid grid-cols-3 gap-4",
                div { class: "col-span-2", Outlet::<Route> {} }
                AlertPanel {}
            }
        }
    }
}

/// 首页展示上次停留的视图。
#[component]
fn Home() -> Element {
    let view = use_views().active_view();
    rsx! { ViewPanel { view } }
}

#[component]
fn ViewPage(view: String) -> Element {
    match ViewKey::parse(&view) {
        Some(key) => rsx! { ViewPanel { view: key } },
        None => {
            warn!(%view, "unknown view requested");
            rsx! {
                p { class: "text-xs text-slate-500", "未知视图：{view}" }
            }
        }
    }
}
