pub mod playback;
pub mod realtime;
pub mod views;

use dioxus::prelude::*;
use serde_json::Value;

use netpulse_console::realtime::{RealtimeSession, Scheduler, Transport};
use netpulse_console::state::DashboardSnapshot;
use netpulse_console::time_cursor::TimeCursor;
use netpulse_console::views::{ViewDataSource, ViewOrchestrator};

pub type AppSignal = Signal<DashboardSnapshot>;

/// 核心组件变更后把快照同步到 Signal；UI 只读快照。
#[derive(Clone, Copy)]
pub struct AppActions {
    state: AppSignal,
}

impl AppActions {
    pub fn new(state: AppSignal) -> Self {
        Self { state }
    }

    pub fn sync_realtime<T, S>(&self, session: &RealtimeSession<T, S>)
    where
        T: Transport,
        S: Scheduler,
    {
        if self.state.peek().realtime_revision == Some(session.revision()) {
            return;
        }
        let mut state = self.state;
        state.write().capture_realtime(session);
    }

    pub fn sync_views<D>(&self, orchestrator: &ViewOrchestrator<D>)
    where
        D: ViewDataSource,
    {
        if self.state.peek().views_revision == Some(orchestrator.revision()) {
            return;
        }
        let mut state = self.state;
        state.write().capture_views(orchestrator);
    }

    pub fn sync_cursor(&self, cursor: &TimeCursor) {
        if self.state.peek().cursor.version == cursor.version() && cursor.version() > 0 {
            return;
        }
        let mut state = self.state;
        state.write().capture_cursor(cursor);
    }

    pub fn record_metrics(&self, payload: Value) {
        let mut state = self.state;
        state.write().latest_metrics = Some(payload);
    }
}

pub fn use_app_state() -> AppSignal {
    use_context::<AppSignal>()
}

pub fn use_app_actions() -> AppActions {
    AppActions::new(use_app_state())
}
