use dioxus::prelude::*;
use dioxus_router::prelude::*;
use serde_json::Value;

use netpulse_console::models::ViewKey;
use netpulse_console::time_cursor::ComponentId;

use crate::hooks::playback::use_timeline;
use crate::hooks::use_app_state;
use crate::hooks::views::{use_view_data, use_views};
use crate::ui::playback::PlaybackBar;
use crate::Route;

#[component]
pub fn ViewTabs() -> Element {
    rsx! {
        nav { class: "flex gap-2 border-b border-slate-200 text-sm",
            for key in ViewKey::ALL {
                Link {
                    key: "{key}",
                    class: "px-3 py-2 text-slate-500 hover:text-slate-800",
                    active_class: "border-b-2 border-slate-900 font-semibold text-slate-900",
                    to: Route::ViewPage { view: key.as_str().to_string() },
                    "{key.title()}"
                }
            }
        }
    }
}

#[component]
pub fn ViewPanel(view: ViewKey) -> Element {
    let key = view;
    let views = use_view_data(key);
    let slot = use_app_state().read().slot(key);
    let refresh = views.clone();

    let status = if slot.loading {
        rsx! { span { class: "text-xs text-slate-500", "加载中..." } }
    } else if let Some(err) = slot.error.as_ref() {
        rsx! { span { class: "text-xs text-red-500", "加载失败: {err}" } }
    } else {
        rsx! { Fragment {} }
    };

    rsx! {
        section { class: "rounded-lg border border-slate-200 bg-white p-4 shadow-sm space-y-3",
            header { class: "flex items-center justify-between",
                h2 { class: "text-sm font-semibold text-slate-800", "{key.title()}" }
                div { class: "flex items-center gap-3",
                    {status}
                    if let Some(scope) = slot.scope.as_ref() {
                        span { class: "font-mono text-[11px] text-slate-400", "时间片 {scope}" }
                    }
                    button {
                        class: "rounded border border-slate-200 px-2 py-1 text-[11px] hover:bg-slate-100",
                        disabled: slot.loading,
                        onclick: move |_| refresh.refresh(),
                        "刷新"
                    }
                }
            }
            if key == ViewKey::RegionMap {
                RegionTimeline {}
            }
            div { class: "grid grid-cols-2 gap-3",
                for section in key.sections().iter().copied() {
                    SectionCard {
                        key: "{section}",
                        name: section.to_string(),
                        value: slot.data.as_ref().and_then(|data| data.get(section)).cloned(),
                    }
                }
            }
        }
    }
}

#[component]
fn SectionCard(name: String, value: Option<Value>) -> Element {
    let preview = value
        .as_ref()
        .map(|value| {
            let text = value.to_string();
            if text.chars().count() > 240 {
                format!("{}…", text.chars().take(240).collect::<String>())
            } else {
                text
            }
        })
        .unwrap_or_else(|| "暂无数据".to_string());

    rsx! {
        div { class: "rounded border border-slate-100 bg-slate-50 p-3 space-y-1",
            h3 { class: "text-xs font-medium text-slate-700", "{name}" }
            pre { class: "whitespace-pre-wrap break-all font-mono text-[11px] text-slate-500", "{preview}" }
        }
    }
}

/// 区域态势跟随时间游标：游标变化时按时间片重新拉取，点选整点即作为外部写入。
#[component]
fn RegionTimeline() -> Element {
    let views = use_views();
    let timeline = use_timeline();
    let app_state = use_app_state();
    let origin = use_hook(ComponentId::new);

    let cursor = use_memo(move || app_state.read().cursor.clone());
    let follower = views.clone();
    use_effect(move || {
        let cursor = cursor();
        if let Some(label) = cursor.label.filter(|_| cursor.version > 0) {
            follower.fetch_at(ViewKey::RegionMap, label);
        }
    });

    let current = cursor().label.unwrap_or_default();
    let quick_hours = ["00:00", "06:00", "12:00", "18:00"];

    rsx! {
        div { class: "space-y-2",
            PlaybackBar {}
            div { class: "flex gap-2 text-[11px]",
                for hour in quick_hours {
                    button {
                        key: "{hour}",
                        class: if hour == current { "rounded bg-slate-900 px-2 py-1 text-white" } else { "rounded border border-slate-200 px-2 py-1" },
                        onclick: {
                            let timeline = timeline.clone();
                            move |_| timeline.push_external(origin, hour)
                        },
                        "{hour}"
                    }
                }
            }
        }
    }
}
