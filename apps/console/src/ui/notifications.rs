use std::collections::BTreeSet;

use dioxus::prelude::*;

use crate::hooks::realtime::use_realtime;
use crate::hooks::use_app_state;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Error,
    Warning,
    Info,
}

impl ToastKind {
    fn accent_classes(self) -> (&'static str, &'static str) {
        match self {
            Self::Error => ("border-red-500 bg-red-50", "text-red-700"),
            Self::Warning => ("border-amber-500 bg-amber-50", "text-amber-700"),
            Self::Info => ("border-slate-500 bg-slate-50", "text-slate-700"),
        }
    }
}

#[component]
pub fn Toast(
    kind: ToastKind,
    title: String,
    message: String,
    #[props(default)] details: Vec<(String, String)>,
    on_close: EventHandler<MouseEvent>,
) -> Element {
    let (container_class, accent_text) = kind.accent_classes();

    rsx! {
        div { class: format!("pointer-events-auto rounded-lg border-l-4 p-4 shadow-lg {}", container_class),
            div { class: "flex items-start justify-between gap-4",
                div { class: "space-y-1",
                    h3 { class: format!("text-sm font-semibold {}", accent_text), "{title}" }
                    p { class: "text-xs text-slate-700", "{message}" }
                    if !details.is_empty() {
                        ul { class: "mt-2 space-y-1 text-[11px] text-slate-500",
                            for (label, value) in details.iter() {
                                li {
                                    span { class: "font-medium", "{label}: " }
                                    span { class: "font-mono break-all", "{value}" }
                                }
                            }
                        }
                    }
                }
                button {
                    class: "rounded bg-slate-200 px-2 py-1 text-[11px] text-slate-600 transition hover:bg-slate-300",
                    onclick: move |evt| on_close.call(evt),
                    "关闭"
                }
            }
        }
    }
}

/// 右上角提示：重连耗尽、紧急告警、当前视图拉取失败。
#[component]
pub fn NotificationCenter() -> Element {
    let realtime = use_realtime();
    let snapshot = use_app_state().read().clone();
    let mut dismissed = use_signal(BTreeSet::<String>::new);

    let mut toasts: Vec<Element> = Vec::new();

    let connection = &snapshot.connection;
    if connection.exhausted && !dismissed.read().contains("connection") {
        let mut details = vec![("重连次数".to_string(), connection.attempts.to_string())];
        if let Some(err) = connection.last_error.clone() {
            details.push(("最近错误".to_string(), err));
        }
        toasts.push(rsx! {
            Toast {
                key: "connection",
                kind: ToastKind::Warning,
                title: "告警推送已中断".to_string(),
                message: "自动重连已停止，请手动重新连接。".to_string(),
                details,
                on_close: move |_| {
                    dismissed.write().insert("connection".to_string());
                },
            }
        });
    }

    for alert in snapshot.urgent_alerts().take(3) {
        let id = alert.id.clone();
        let handle = realtime.clone();
        toasts.push(rsx! {
            Toast {
                key: "{alert.id}",
                kind: ToastKind::Error,
                title: alert.title.clone(),
                message: format!("{} · {}", alert.area, alert.time),
                on_close: move |_| handle.mark_read(&id),
            }
        });
    }

    let active = snapshot.active_view;
    if let Some(error) = snapshot.active_slot().error {
        let dismiss_key = format!("view-{}", active.as_str());
        if !dismissed.read().contains(&dismiss_key) {
            let toast_key = dismiss_key.clone();
            toasts.push(rsx! {
                Toast {
                    key: "{toast_key}",
                    kind: ToastKind::Info,
                    title: format!("{}数据加载失败", active.title()),
                    message: error,
                    on_close: move |_| {
                        dismissed.write().insert(dismiss_key.clone());
                    },
                }
            });
        }
    }

    if toasts.is_empty() {
        return rsx! { Fragment {} };
    }

    rsx! {
        div { class: "pointer-events-none fixed right-4 top-4 z-50 flex w-80 flex-col gap-3",
            for toast in toasts {
                {toast}
            }
        }
    }
}
