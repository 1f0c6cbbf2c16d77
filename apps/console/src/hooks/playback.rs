use std::cell::RefCell;
use std::rc::Rc;

use dioxus::prelude::*;
use gloo_timers::future::TimeoutFuture;

use netpulse_console::config::PlaybackOptions;
use netpulse_console::time_cursor::{
    ComponentId, PlaybackController, PlaybackState, TimeCursor, TimeSlots, TimeUpdate,
};

use super::{use_app_actions, use_app_state, AppActions};
use crate::APP_CONFIG;

/// 共享时间游标。所有写入都经由 `publish`，随后快照里的 cursor.version 递增，
/// 订阅的播放控件在 effect 中对齐。
#[derive(Clone)]
pub struct TimelineHandle {
    cursor: Rc<RefCell<TimeCursor>>,
    actions: AppActions,
}

impl PartialEq for TimelineHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cursor, &other.cursor)
    }
}

impl TimelineHandle {
    pub fn slots(&self) -> TimeSlots {
        self.cursor.borrow().slots().clone()
    }

    pub fn last_update(&self) -> Option<TimeUpdate> {
        self.cursor.borrow().last_update().cloned()
    }

    pub fn publish(&self, update: TimeUpdate) {
        let published = self.cursor.borrow_mut().write(update);
        if published.is_some() {
            self.actions.sync_cursor(&self.cursor.borrow());
        }
    }

    /// 非播放控件（例如地图上点选时间）推送权威时间。
    pub fn push_external(&self, origin: ComponentId, label: &str) {
        let published = self.cursor.borrow_mut().push_external(origin, label);
        if published.is_some() {
            self.actions.sync_cursor(&self.cursor.borrow());
        }
    }
}

pub fn use_timeline_provider() -> TimelineHandle {
    let actions = use_app_actions();
    let handle = use_hook(|| TimelineHandle {
        cursor: Rc::new(RefCell::new(TimeCursor::new(TimeSlots::hourly()))),
        actions,
    });
    use_context_provider(|| handle.clone());

    let initial = handle.clone();
    use_effect(move || {
        initial.actions.sync_cursor(&initial.cursor.borrow());
    });
    handle
}

pub fn use_timeline() -> TimelineHandle {
    use_context::<TimelineHandle>()
}

#[derive(Clone)]
pub struct PlaybackHandle {
    controller: Rc<RefCell<PlaybackController>>,
    timeline: TimelineHandle,
    state: Signal<PlaybackState>,
}

impl PartialEq for PlaybackHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.controller, &other.controller)
    }
}

impl PlaybackHandle {
    pub fn state(&self) -> PlaybackState {
        (self.state)()
    }

    pub fn slots(&self) -> TimeSlots {
        self.timeline.slots()
    }

    pub fn play(&self) {
        self.apply(|controller| {
            controller.play();
            None
        });
    }

    pub fn pause(&self) {
        self.apply(|controller| {
            controller.pause();
            None
        });
    }

    pub fn toggle(&self) {
        if self.controller.borrow().is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn next(&self) {
        self.apply(PlaybackController::next);
    }

    pub fn prev(&self) {
        self.apply(PlaybackController::prev);
    }

    pub fn reset(&self) {
        self.apply(PlaybackController::reset);
    }

    pub fn seek(&self, index: usize) {
        self.apply(|controller| controller.seek(index));
    }

    fn tick(&self) {
        if !self.controller.borrow().is_playing() {
            return;
        }
        self.apply(PlaybackController::tick);
    }

    fn reconcile(&self) {
        let Some(update) = self.timeline.last_update() else {
            return;
        };
        if self.controller.borrow_mut().observe(&update) {
            self.sync_local();
        }
    }

    fn apply(&self, op: impl FnOnce(&mut PlaybackController) -> Option<TimeUpdate>) {
        let update = op(&mut self.controller.borrow_mut());
        self.sync_local();
        if let Some(update) = update {
            self.timeline.publish(update);
        }
    }

    fn sync_local(&self) {
        let next = self.controller.borrow().state();
        let mut state = self.state;
        if *state.peek() != next {
            state.set(next);
        }
    }
}

/// 每个播放控件各自持有一个 [`PlaybackController`]，共享同一个时间游标。
pub fn use_playback() -> PlaybackHandle {
    let timeline = use_timeline();
    let app_state = use_app_state();
    let state = use_signal(PlaybackState::default);

    let handle = use_hook(|| {
        let options = APP_CONFIG
            .get()
            .map(|config| config.playback_options())
            .unwrap_or_else(PlaybackOptions::default);
        PlaybackHandle {
            controller: Rc::new(RefCell::new(PlaybackController::new(
                &timeline.slots(),
                options,
            ))),
            timeline: timeline.clone(),
            state,
        }
    });

    let version = use_memo(move || app_state.read().cursor.version);
    let observer = handle.clone();
    use_effect(move || {
        // 订阅游标版本，外部写入后静默对齐
        let _ = version();
        observer.reconcile();
    });

    let ticker = handle.clone();
    use_future(move || {
        let handle = ticker.clone();
        async move {
            let interval = handle.controller.borrow().options().interval;
            let millis = interval.as_millis().min(u32::MAX as u128) as u32;
            loop {
                TimeoutFuture::new(millis).await;
                handle.tick();
            }
        }
    });

    handle
}
