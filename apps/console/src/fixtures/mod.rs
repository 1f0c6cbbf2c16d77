//! 演示数据：未接入后端时驱动看板与告警面板。

use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::models::{AlertLevel, AlertRecord, ViewKey};
use crate::views::{FetchError, ViewDataSource};

/// 返回演示用的历史告警，最新的在前。
pub fn sample_alerts() -> Vec<AlertRecord> {
    let now = OffsetDateTime::now_utc();
    let seeds = [
        ("hist-06", AlertLevel::High, "小区 PRB 利用率超过 90%", "浦东新区"),
        ("hist-05", AlertLevel::Medium, "传输链路时延抖动", "徐汇区"),
        ("hist-04", AlertLevel::High, "核心网会话建立成功率下降", "静安区"),
        ("hist-03", AlertLevel::Low, "基站退服后已恢复", "黄浦区"),
        ("hist-02", AlertLevel::Info, "例行割接窗口开始", "闵行区"),
        ("hist-01", AlertLevel::Medium, "视频业务卡顿率升高", "长宁区"),
    ];

    seeds
        .into_iter()
        .enumerate()
        .map(|(offset, (id, level, title, area))| {
            let at = now - time::Duration::minutes(offset as i64 * 7);
            AlertRecord {
                id: id.to_string(),
                level,
                title: title.to_string(),
                area: area.to_string(),
                time: format!("{:02}:{:02}", at.hour(), at.minute()),
                read: offset >= 4,
            }
        })
        .collect()
}

/// 确定性的视图数据源：同一 (视图, 子请求, 时间片) 总是返回相同的数据。
#[derive(Clone, Copy, Debug, Default)]
pub struct FixtureSource;

impl ViewDataSource for FixtureSource {
    fn fetch_section<'a>(
        &'a self,
        key: ViewKey,
        section: &'static str,
        scope: Option<&'a str>,
    ) -> LocalBoxFuture<'a, Result<Value, FetchError>> {
        future::ready(Ok(section_payload(key, section, scope))).boxed_local()
    }
}

pub fn section_payload(key: ViewKey, section: &str, scope: Option<&str>) -> Value {
    let mut rng = Lcg::seeded(key.as_str(), section, scope);
    let hours: Vec<String> = (0..24).map(|h| format!("{h:02}:00")).collect();

    let body = match section {
        "summary" | "capacity_summary" | "kqi_summary" => json!({
            "cells": 1_200 + rng.below(300),
            "online_rate": 95.0 + rng.fraction() * 4.9,
            "traffic_tb": 40 + rng.below(25),
        }),
        "traffic_trend" | "utilization_trend" | "kqi_trend" => json!({
            "labels": hours,
            "values": (0..24).map(|_| 30 + rng.below(70)).collect::<Vec<_>>(),
        }),
        "top_cells" | "hotspots" | "degraded_services" => json!(
            (1..=5)
                .map(|rank| json!({"rank": rank, "name": format!("CELL-{:04}", rng.below(9_999)), "load": 60 + rng.below(40)}))
                .collect::<Vec<_>>()
        ),
        "alarm_distribution" => json!({
            "high": rng.below(12),
            "medium": rng.below(30),
            "low": rng.below(50),
        }),
        "regions" | "links" | "incidents" => json!(
            ["浦东", "徐汇", "静安", "黄浦"]
                .iter()
                .map(|area| json!({"area": area, "value": rng.below(100)}))
                .collect::<Vec<_>>()
        ),
        _ => json!({}),
    };

    json!({
        "view": key.as_str(),
        "section": section,
        "time": scope,
        "body": body,
    })
}

/// 小型线性同余发生器，演示数据不需要密码学强度的随机数。
struct Lcg(u64);

impl Lcg {
    fn seeded(view: &str, section: &str, scope: Option<&str>) -> Self {
        let seed = [view, section, scope.unwrap_or("")]
            .iter()
            .flat_map(|part| part.bytes())
            .fold(0xcbf2_9ce4_8422_2325u64, |acc, byte| {
                (acc ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
            });
        Self(seed)
    }

    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound.max(1)
    }

    fn fraction(&mut self) -> f64 {
        (self.next() % 1_000) as f64 / 1_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertStore;
    use crate::config::OrchestratorOptions;
    use crate::views::{ViewFetchOutcome, ViewOrchestrator};
    use futures::executor::block_on;

    #[test]
    fn sample_history_loads_into_store() {
        let mut store = AlertStore::default();
        let size = store.load_history(sample_alerts());
        assert_eq!(size, 6);
        assert_eq!(store.snapshot()[0].id, "hist-06");
        // 已读的两条中有一条是 info，本就不计未读
        assert_eq!(store.unread_count(), 4);
    }

    #[test]
    fn payloads_are_deterministic_per_scope() {
        let a = section_payload(ViewKey::NetworkOverview, "summary", Some("08:00"));
        let b = section_payload(ViewKey::NetworkOverview, "summary", Some("08:00"));
        let c = section_payload(ViewKey::NetworkOverview, "summary", Some("09:00"));
        assert_eq!(a, b);
        assert_ne!(a["body"], c["body"]);
        assert_eq!(a["time"], json!("08:00"));
    }

    #[test]
    fn fixture_source_feeds_every_view() {
        let orchestrator = ViewOrchestrator::new(FixtureSource, OrchestratorOptions::default());
        for key in ViewKey::ALL {
            assert_eq!(block_on(orchestrator.fetch_view(key)), ViewFetchOutcome::Applied);
            let data = orchestrator.slot(key).data.unwrap();
            for section in key.sections() {
                assert_eq!(data[*section]["section"], json!(section));
            }
        }
    }
}
