use dioxus::prelude::*;

use netpulse_console::realtime::ConnectionState;

use crate::hooks::realtime::use_realtime;
use crate::hooks::use_app_state;

#[component]
pub fn ConnectionBadge() -> Element {
    let realtime = use_realtime();
    let snapshot = use_app_state().read().clone();
    let status = snapshot.connection;

    let dot_class = match status.state {
        ConnectionState::Open => "bg-emerald-500",
        ConnectionState::Connecting => "bg-amber-400 animate-pulse",
        ConnectionState::Errored => "bg-red-500",
        ConnectionState::Closed | ConnectionState::Idle => "bg-slate-400",
    };
    let label = if status.reconnect_pending {
        format!("{}（第 {} 次重连等待中）", status.state.label(), status.attempts)
    } else {
        status.state.label().to_string()
    };
    let connected = status.is_connected();
    let since = status
        .connected_since
        .map(|at| format!("{:02}:{:02}:{:02}", at.hour(), at.minute(), at.second()));

    let connect = realtime.clone();
    let disconnect = realtime.clone();
    let resubscribe = realtime.clone();

    rsx! {
        div { class: "flex items-center gap-3 text-xs text-slate-600",
            span { class: format!("inline-block h-2 w-2 rounded-full {}", dot_class) }
            span { "{label}" }
            if let Some(since) = since {
                span { class: "text-[11px] text-slate-400", "自 {since}" }
            }
            if connected {
                button {
                    class: "rounded border border-slate-200 px-2 py-1 hover:bg-slate-100",
                    onclick: move |_| {
                        resubscribe.resubscribe();
                    },
                    "重新订阅"
                }
                button {
                    class: "rounded border border-slate-200 px-2 py-1 hover:bg-slate-100",
                    onclick: move |_| disconnect.disconnect(),
                    "断开"
                }
            } else {
                button {
                    class: "rounded bg-slate-900 px-2 py-1 text-white hover:bg-slate-700",
                    onclick: move |_| connect.connect(),
                    "连接"
                }
            }
        }
    }
}
