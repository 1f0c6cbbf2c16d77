use serde_json::Value;
use tracing::{debug, warn};

use crate::alerts::AlertStore;
use crate::models::{AlertClearPayload, AlertRecord, AlertUpdatePayload};
use crate::realtime::protocol::{Envelope, MessageKind};

/// 指标推送的消费者，核心只保证送达，不解释内容。
pub trait MetricsSink {
    fn deliver(&mut self, payload: &Value);
}

impl<F> MetricsSink for F
where
    F: FnMut(&Value),
{
    fn deliver(&mut self, payload: &Value) {
        self(payload)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    AlertAppended { size: usize },
    AlertUpdated { applied: bool },
    AlertCleared { removed: bool },
    MetricsDelivered { delivered: bool },
    Heartbeat,
    Ignored { kind: String },
    Dropped { reason: String },
}

impl RouteOutcome {
    /// 告警集合是否可能发生了变化。
    pub fn touches_alerts(&self) -> bool {
        matches!(
            self,
            Self::AlertAppended { .. }
                | Self::AlertUpdated { applied: true }
                | Self::AlertCleared { removed: true }
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub routed: u64,
    pub dropped: u64,
    pub unknown: u64,
    pub undelivered_metrics: u64,
}

#[derive(Default)]
pub struct MessageRouter {
    metrics: Option<Box<dyn MetricsSink>>,
    stats: RouterStats,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_metrics(&mut self, sink: impl MetricsSink + 'static) {
        self.metrics = Some(Box::new(sink));
    }

    pub fn unregister_metrics(&mut self) {
        self.metrics = None;
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// 按到达顺序逐条处理。payload 解析失败在这里被吞掉并记录，不会越过路由边界。
    pub fn route(&mut self, envelope: &Envelope, alerts: &mut AlertStore) -> RouteOutcome {
        let outcome = match &envelope.kind {
            MessageKind::Alert => match envelope.decode_payload::<AlertRecord>() {
                Ok(record) => RouteOutcome::AlertAppended {
                    size: alerts.append(record),
                },
                Err(err) => self.drop_payload(err.to_string()),
            },
            MessageKind::AlertUpdate => match envelope.decode_payload::<AlertUpdatePayload>() {
                Ok(update) => {
                    let applied = alerts.update(&update.id, &update.patch);
                    if !applied {
                        debug!(id = %update.id, "update for unknown alert ignored");
                    }
                    RouteOutcome::AlertUpdated { applied }
                }
                Err(err) => self.drop_payload(err.to_string()),
            },
            MessageKind::AlertClear => match envelope.decode_payload::<AlertClearPayload>() {
                Ok(clear) => RouteOutcome::AlertCleared {
                    removed: alerts.remove(&clear.id),
                },
                Err(err) => self.drop_payload(err.to_string()),
            },
            MessageKind::MetricsUpdate => {
                let delivered = match self.metrics.as_mut() {
                    Some(sink) => {
                        sink.deliver(&envelope.payload);
                        true
                    }
                    None => {
                        self.stats.undelivered_metrics += 1;
                        debug!("metrics update without registered consumer");
                        false
                    }
                };
                RouteOutcome::MetricsDelivered { delivered }
            }
            MessageKind::Ping => RouteOutcome::Heartbeat,
            MessageKind::Unknown(kind) => {
                self.stats.unknown += 1;
                warn!(%kind, "unrecognized message type");
                RouteOutcome::Ignored { kind: kind.clone() }
            }
        };

        if !matches!(outcome, RouteOutcome::Dropped { .. }) {
            self.stats.routed += 1;
        }
        outcome
    }

    fn drop_payload(&mut self, reason: String) -> RouteOutcome {
        self.stats.dropped += 1;
        warn!(%reason, "dropping message");
        RouteOutcome::Dropped { reason }
    }
}
