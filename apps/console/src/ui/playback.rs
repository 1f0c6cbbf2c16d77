use dioxus::prelude::*;

use crate::hooks::playback::use_playback;

#[component]
pub fn PlaybackBar() -> Element {
    let playback = use_playback();
    let state = playback.state();
    let slots = playback.slots();
    let max = slots.last_index();
    let label = slots.label(state.index).unwrap_or("--:--").to_string();

    let toggle = playback.clone();
    let prev = playback.clone();
    let next = playback.clone();
    let reset = playback.clone();
    let seek = playback.clone();

    rsx! {
        div { class: "flex items-center gap-2 text-xs text-slate-600",
            button {
                class: "rounded border border-slate-200 px-2 py-1 hover:bg-slate-100",
                onclick: move |_| reset.reset(),
                "⏮"
            }
            button {
                class: "rounded border border-slate-200 px-2 py-1 hover:bg-slate-100",
                onclick: move |_| prev.prev(),
                "◀"
            }
            button {
                class: "rounded bg-slate-900 px-3 py-1 text-white hover:bg-slate-700",
                onclick: move |_| toggle.toggle(),
                if state.playing { "暂停" } else { "播放" }
            }
            button {
                class: "rounded border border-slate-200 px-2 py-1 hover:bg-slate-100",
                onclick: move |_| next.next(),
                "▶"
            }
            input {
                class: "flex-1",
                r#type: "range",
                min: "0",
                max: "{max}",
                value: "{state.index}",
                oninput: move |evt| {
                    if let Ok(index) = evt.value().parse::<usize>() {
                        seek.seek(index);
                    }
                },
            }
            span { class: "w-12 text-right font-mono", "{label}" }
        }
    }
}
