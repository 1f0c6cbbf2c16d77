use std::collections::BTreeMap;

use serde_json::Value;

use crate::models::{AlertLevel, AlertRecord, ViewKey};
use crate::realtime::{ConnectionStatus, RealtimeSession, RouterStats, Scheduler, Transport};
use crate::time_cursor::TimeCursor;
use crate::views::{ViewDataSlot, ViewDataSource, ViewOrchestrator};

/// UI 读取的只读快照。各核心组件各自持有可变状态，宿主在每次变更后刷新对应部分。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DashboardSnapshot {
    pub connection: ConnectionStatus,
    pub alerts: Vec<AlertRecord>,
    pub unread: usize,
    pub router: RouterStats,
    pub realtime_revision: Option<u64>,
    pub views: BTreeMap<ViewKey, ViewDataSlot>,
    pub active_view: ViewKey,
    pub views_revision: Option<u64>,
    pub cursor: CursorSnapshot,
    /// 最近一次 METRICS_UPDATE 的原始载荷。
    pub latest_metrics: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CursorSnapshot {
    pub index: usize,
    pub label: Option<String>,
    pub version: u64,
    pub slot_count: usize,
}

impl DashboardSnapshot {
    /// 返回 true 表示快照有变化。
    pub fn capture_realtime<T, S>(&mut self, session: &RealtimeSession<T, S>) -> bool
    where
        T: Transport,
        S: Scheduler,
    {
        if self.realtime_revision == Some(session.revision()) {
            return false;
        }
        self.connection = session.status();
        self.alerts = session.alerts().snapshot();
        self.unread = session.unread_count();
        self.router = session.router().stats();
        self.realtime_revision = Some(session.revision());
        true
    }

    pub fn capture_views<D>(&mut self, orchestrator: &ViewOrchestrator<D>) -> bool
    where
        D: ViewDataSource,
    {
        if self.views_revision == Some(orchestrator.revision()) {
            return false;
        }
        self.views = orchestrator.snapshot();
        self.active_view = orchestrator.active_view();
        self.views_revision = Some(orchestrator.revision());
        true
    }

    pub fn capture_cursor(&mut self, cursor: &TimeCursor) {
        self.cursor = CursorSnapshot {
            index: cursor.index(),
            label: cursor.label().map(str::to_string),
            version: cursor.version(),
            slot_count: cursor.slots().len(),
        };
    }

    pub fn slot(&self, key: ViewKey) -> ViewDataSlot {
        self.views.get(&key).cloned().unwrap_or_default()
    }

    pub fn active_slot(&self) -> ViewDataSlot {
        self.slot(self.active_view)
    }

    /// 未读的高等级告警，用于顶部横幅。
    pub fn urgent_alerts(&self) -> impl Iterator<Item = &AlertRecord> {
        self.alerts
            .iter()
            .filter(|record| record.level == AlertLevel::High && record.is_unread())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OrchestratorOptions, PlaybackOptions};
    use crate::fixtures::FixtureSource;
    use crate::realtime::connection::testing::{options, ManualScheduler, RecordingTransport};
    use crate::realtime::TransportEvent;
    use crate::time_cursor::{PlaybackController, TimeSlots};
    use futures::executor::block_on;
    use serde_json::json;

    #[test]
    fn realtime_capture_follows_session_revision() {
        let mut session = RealtimeSession::new(
            RecordingTransport::default(),
            ManualScheduler::default(),
            options(),
            10,
        );
        let mut snapshot = DashboardSnapshot::default();
        session.connect();
        session.handle_event(TransportEvent::Opened);
        session.handle_event(TransportEvent::Message(
            json!({"type": "ALERT", "payload": {"id": "a-1", "level": "high"}}).to_string(),
        ));

        assert!(snapshot.capture_realtime(&session));
        assert!(snapshot.connection.is_connected());
        assert_eq!(snapshot.unread, 1);
        assert_eq!(snapshot.urgent_alerts().count(), 1);
        assert!(!snapshot.capture_realtime(&session));

        session.mark_read("a-1");
        assert!(snapshot.capture_realtime(&session));
        assert_eq!(snapshot.urgent_alerts().count(), 0);
    }

    #[test]
    fn view_and_cursor_capture() {
        let orchestrator = ViewOrchestrator::new(FixtureSource, OrchestratorOptions::default());
        orchestrator.activate(ViewKey::RegionMap);
        block_on(orchestrator.refresh_current_view());

        let mut snapshot = DashboardSnapshot::default();
        assert!(snapshot.capture_views(&orchestrator));
        assert_eq!(snapshot.active_view, ViewKey::RegionMap);
        assert!(snapshot.active_slot().data.is_some());
        assert!(snapshot.slot(ViewKey::NetworkOverview).data.is_none());

        let slots = TimeSlots::hourly();
        let mut cursor = TimeCursor::new(slots.clone());
        let mut playback = PlaybackController::new(&slots, PlaybackOptions::default());
        if let Some(update) = playback.seek(6) {
            cursor.write(update);
        }
        snapshot.capture_cursor(&cursor);
        assert_eq!(snapshot.cursor.label.as_deref(), Some("06:00"));
        assert_eq!(snapshot.cursor.slot_count, 24);
        assert_eq!(snapshot.cursor.version, 1);
    }
}
