pub mod connection;
pub mod protocol;
pub mod router;
pub mod socket;

use tracing::debug;

use crate::alerts::AlertStore;
use crate::config::ConnectionOptions;
use crate::models::AlertRecord;

pub use connection::{
    ConnectionCallbacks, ConnectionManager, ConnectionState, ConnectionStatus, FrameOutcome,
    Scheduler, TimerToken, Transport, TransportError, TransportEvent,
};
pub use protocol::{Envelope, MessageKind, OutboundMessage, ProtocolError};
pub use router::{MessageRouter, MetricsSink, RouteOutcome, RouterStats};

/// 连接 → 路由 → 告警集合 的组合体，宿主只需把传输事件和计时器到期转交进来。
pub struct RealtimeSession<T, S> {
    connection: ConnectionManager<T, S>,
    router: MessageRouter,
    alerts: AlertStore,
    revision: u64,
}

impl<T, S> RealtimeSession<T, S>
where
    T: Transport,
    S: Scheduler,
{
    pub fn new(transport: T, scheduler: S, options: ConnectionOptions, alert_capacity: usize) -> Self {
        Self {
            connection: ConnectionManager::new(transport, scheduler, options),
            router: MessageRouter::new(),
            alerts: AlertStore::with_capacity(alert_capacity),
            revision: 0,
        }
    }

    pub fn connection(&self) -> &ConnectionManager<T, S> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager<T, S> {
        &mut self.connection
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut MessageRouter {
        &mut self.router
    }

    pub fn alerts(&self) -> &AlertStore {
        &self.alerts
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn unread_count(&self) -> usize {
        self.alerts.unread_count()
    }

    /// 每次可能改变可见状态的调用都会递增，UI 据此判断是否需要刷新快照。
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn connect(&mut self) {
        self.connection.connect_default();
        self.bump();
    }

    pub fn connect_to(&mut self, endpoint: impl Into<String>, channels: Vec<String>) {
        self.connection.connect(endpoint, channels);
        self.bump();
    }

    pub fn disconnect(&mut self) {
        self.connection.disconnect();
        self.bump();
    }

    pub fn send(&mut self, text: &str) -> bool {
        self.connection.send(text)
    }

    pub fn send_json(&mut self, message: &OutboundMessage) -> bool {
        self.connection.send_json(message)
    }

    pub fn handle_event(&mut self, event: TransportEvent) -> Option<RouteOutcome> {
        let envelope = self.connection.handle_event(event);
        let outcome = envelope.map(|envelope| self.router.route(&envelope, &mut self.alerts));
        if let Some(outcome) = outcome.as_ref() {
            debug!(?outcome, "message routed");
        }
        self.bump();
        outcome
    }

    pub fn handle_timer(&mut self, token: TimerToken) {
        self.connection.handle_timer(token);
        self.bump();
    }

    pub fn load_history(&mut self, records: Vec<AlertRecord>) -> usize {
        let size = self.alerts.load_history(records);
        self.bump();
        size
    }

    /// 连接先于历史加载建立时使用：已收到的实时告警排在历史之前，整体一次替换。
    pub fn merge_history(&mut self, history: Vec<AlertRecord>) -> usize {
        let mut records = self.alerts.snapshot();
        records.extend(history);
        self.load_history(records)
    }

    pub fn clear_alerts(&mut self) -> usize {
        let removed = self.alerts.clear_all();
        self.bump();
        removed
    }

    pub fn mark_read(&mut self, id: &str) -> bool {
        let changed = self.alerts.mark_read(id);
        if changed {
            self.bump();
        }
        changed
    }

    pub fn mark_all_read(&mut self) -> usize {
        let changed = self.alerts.mark_all_read();
        self.bump();
        changed
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::connection::testing::{options, ManualScheduler, RecordingTransport};
    use super::*;
    use serde_json::json;

    fn session() -> RealtimeSession<RecordingTransport, ManualScheduler> {
        RealtimeSession::new(
            RecordingTransport::default(),
            ManualScheduler::default(),
            options(),
            100,
        )
    }

    fn frame(kind: &str, payload: serde_json::Value) -> TransportEvent {
        TransportEvent::Message(json!({"type": kind, "payload": payload}).to_string())
    }

    #[test]
    fn inbound_frames_flow_into_alert_store_in_order() {
        let mut session = session();
        session.connect();
        session.handle_event(TransportEvent::Opened);

        session.handle_event(frame(
            "ALERT",
            json!({"id": "a-1", "level": "high", "title": "拥塞", "area": "静安", "time": "08:00"}),
        ));
        let outcome = session.handle_event(frame("ALERT_UPDATE", json!({"id": "a-1", "area": "黄浦"})));
        assert_eq!(outcome, Some(RouteOutcome::AlertUpdated { applied: true }));
        assert_eq!(session.alerts().get("a-1").map(|r| r.area.as_str()), Some("黄浦"));
        assert_eq!(session.unread_count(), 1);

        let ping = session.handle_event(TransportEvent::Message(r#"{"type":"PING"}"#.into()));
        assert_eq!(ping, None);
        assert_eq!(
            session.connection().transport().sent.last().map(String::as_str),
            Some(r#"{"type":"PONG"}"#)
        );
    }

    #[test]
    fn unbounded_influx_stays_capped() {
        let mut session = session();
        session.connect();
        session.handle_event(TransportEvent::Opened);

        for n in 0..1_000 {
            session.handle_event(frame("ALERT", json!({"id": format!("a-{n}"), "level": "medium"})));
        }
        assert_eq!(session.alerts().len(), 100);
        assert_eq!(session.unread_count(), 100);

        assert!(session.mark_read("a-999"));
        assert_eq!(session.unread_count(), 99);
        assert_eq!(session.mark_all_read(), 99);
        assert_eq!(session.clear_alerts(), 100);
        assert_eq!(session.unread_count(), 0);
    }

    #[test]
    fn late_history_keeps_alerts_received_while_loading() {
        let mut session = session();
        session.connect();
        session.handle_event(TransportEvent::Opened);
        session.handle_event(frame(
            "ALERT",
            json!({"id": "a-1", "level": "high", "title": "实时", "time": "09:00"}),
        ));

        let history = vec![
            serde_json::from_value(json!({"id": "a-1", "level": "low", "title": "旧", "read": true})).unwrap(),
            serde_json::from_value(json!({"id": "h-1", "level": "medium"})).unwrap(),
        ];
        assert_eq!(session.merge_history(history), 2);

        let ids: Vec<_> = session.alerts().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a-1", "h-1"]);
        assert_eq!(session.alerts().get("a-1").map(|r| r.title.as_str()), Some("实时"));
        assert_eq!(session.unread_count(), 2);
    }

    #[test]
    fn alert_with_null_level_is_stored_as_info() {
        let mut session = session();
        session.connect();
        session.handle_event(TransportEvent::Opened);

        session.handle_event(frame("ALERT", json!({"id": "a-2", "level": null, "title": "抖动"})));
        assert_eq!(
            session.alerts().get("a-2").map(|r| r.level),
            Some(crate::models::AlertLevel::Info)
        );
        assert_eq!(session.unread_count(), 0);
    }

    #[test]
    fn send_reports_success_only_while_open() {
        let mut session = session();
        assert!(!session.send(r#"{"type":"SUBSCRIBE","channels":["alerts"]}"#));

        session.connect();
        session.handle_event(TransportEvent::Opened);
        let text = OutboundMessage::subscribe(["kqi"]).to_text().unwrap();
        assert!(session.send(&text));
        assert_eq!(
            session.connection().transport().sent.last().map(String::as_str),
            Some(r#"{"type":"SUBSCRIBE","channels":["kqi"]}"#)
        );

        session.disconnect();
        assert!(!session.send(&text));
    }

    #[test]
    fn revision_moves_with_state_changes() {
        let mut session = session();
        let before = session.revision();
        session.connect();
        assert!(session.revision() > before);

        let before = session.revision();
        assert!(!session.mark_read("nothing"));
        assert_eq!(session.revision(), before);
    }
}
