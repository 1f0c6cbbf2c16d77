use dioxus::prelude::*;

use netpulse_console::models::{AlertLevel, AlertRecord};

use crate::hooks::realtime::use_realtime;
use crate::hooks::use_app_state;

fn level_classes(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::High => "bg-red-100 text-red-700",
        AlertLevel::Medium => "bg-amber-100 text-amber-700",
        AlertLevel::Low => "bg-sky-100 text-sky-700",
        AlertLevel::Info => "bg-slate-100 text-slate-600",
    }
}

#[component]
pub fn AlertPanel() -> Element {
    let realtime = use_realtime();
    let snapshot = use_app_state().read().clone();
    let alerts = snapshot.alerts;
    let unread = snapshot.unread;

    let mark_all = realtime.clone();
    let clear = realtime.clone();

    rsx! {
        section { class: "rounded-lg border border-slate-200 bg-white p-4 shadow-sm space-y-3",
            header { class: "flex items-center justify-between",
                h2 { class: "text-sm font-semibold text-slate-800",
                    "实时告警"
                    if unread > 0 {
                        span { class: "ml-2 rounded-full bg-red-500 px-2 text-[11px] text-white", "{unread}" }
                    }
                }
                div { class: "flex gap-2 text-[11px]",
                    button {
                        class: "rounded border border-slate-200 px-2 py-1 hover:bg-slate-100",
                        disabled: unread == 0,
                        onclick: move |_| mark_all.mark_all_read(),
                        "全部已读"
                    }
                    button {
                        class: "rounded border border-slate-200 px-2 py-1 hover:bg-slate-100",
                        disabled: alerts.is_empty(),
                        onclick: move |_| clear.clear_alerts(),
                        "清空"
                    }
                }
            }
            if alerts.is_empty() {
                p { class: "text-xs text-slate-500 italic", "暂无告警" }
            } else {
                ul { class: "max-h-96 space-y-1 overflow-y-auto",
                    for alert in alerts.clone().into_iter() {
                        AlertRow { key: "{alert.id}", alert }
                    }
                }
            }
        }
    }
}

#[component]
fn AlertRow(alert: AlertRecord) -> Element {
    let realtime = use_realtime();
    let unread = alert.is_unread();
    let id = alert.id.clone();
    let row_class = if unread {
        "flex items-center gap-2 rounded px-2 py-1 text-xs text-slate-800 hover:bg-slate-50 cursor-pointer"
    } else {
        "flex items-center gap-2 rounded px-2 py-1 text-xs text-slate-400"
    };

    rsx! {
        li {
            class: row_class,
            onclick: move |_| {
                if unread {
                    realtime.mark_read(&id);
                }
            },
            span { class: format!("rounded px-1.5 text-[10px] uppercase {}", level_classes(alert.level)), "{alert.level}" }
            span { class: "flex-1 truncate", "{alert.title}" }
            span { class: "text-[11px] text-slate-500", "{alert.area}" }
            span { class: "font-mono text-[11px] text-slate-400", "{alert.time}" }
        }
    }
}
