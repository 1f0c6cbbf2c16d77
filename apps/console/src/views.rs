use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use futures::future::{self, Either, LocalBoxFuture};
use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::ClientError;
use crate::config::OrchestratorOptions;
use crate::models::ViewKey;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("请求超时（{}ms）", .after.as_millis())]
    Timeout { after: Duration },
    #[error("{0}")]
    Client(ClientError),
    #[error("{0}")]
    Rejected(String),
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Client(ClientError::Transport(err)) => err.is_timeout(),
            _ => false,
        }
    }
}

impl From<ClientError> for FetchError {
    fn from(err: ClientError) -> Self {
        Self::Client(err)
    }
}

/// 数据访问层：每个视图的每个子请求返回一个普通 JSON 对象。
/// `scope` 为时间游标当前的时间片标签，未限定时为 `None`。
pub trait ViewDataSource {
    fn fetch_section<'a>(
        &'a self,
        key: ViewKey,
        section: &'static str,
        scope: Option<&'a str>,
    ) -> LocalBoxFuture<'a, Result<Value, FetchError>>;
}

impl<D> ViewDataSource for Box<D>
where
    D: ViewDataSource + ?Sized,
{
    fn fetch_section<'a>(
        &'a self,
        key: ViewKey,
        section: &'static str,
        scope: Option<&'a str>,
    ) -> LocalBoxFuture<'a, Result<Value, FetchError>> {
        (**self).fetch_section(key, section, scope)
    }
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
}

/// 请求与计时器竞速，计时器先到时返回 [`FetchError::Timeout`]，请求随之被丢弃。
pub async fn with_timeout<T, F>(sleeper: &dyn Sleeper, after: Duration, request: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    futures::pin_mut!(request);
    match future::select(request, sleeper.sleep(after)).await {
        Either::Left((result, _)) => result,
        Either::Right(_) => Err(FetchError::Timeout { after }),
    }
}

/// wasm 上用浏览器定时器；原生平台不做额外计时，交由 reqwest 自身的超时处理。
#[derive(Clone, Copy, Debug, Default)]
pub struct TimerSleeper;

impl Sleeper for TimerSleeper {
    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        #[cfg(target_arch = "wasm32")]
        {
            let millis = duration.as_millis().min(u32::MAX as u128) as u32;
            gloo_timers::future::TimeoutFuture::new(millis).boxed_local()
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = duration;
            future::pending().boxed_local()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ViewDataSlot {
    pub data: Option<Value>,
    pub loading: bool,
    pub error: Option<String>,
    /// 当前 data 对应的时间片，未限定时为空。
    pub scope: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchTicket {
    pub key: ViewKey,
    pub generation: u64,
    pub scope: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewFetchOutcome {
    Applied,
    Failed(String),
    /// 同一视图已有更新的请求，本次结果被丢弃。
    Superseded,
}

#[derive(Default)]
struct SlotState {
    slot: ViewDataSlot,
    generation: u64,
}

/// 按视图管理并行拉取。每个视图独立的 loading/error 状态，
/// 用代数 (generation) 保证“最后发起的请求为准”。
pub struct ViewOrchestrator<D> {
    source: D,
    sleeper: Box<dyn Sleeper>,
    options: OrchestratorOptions,
    slots: RefCell<BTreeMap<ViewKey, SlotState>>,
    active: Cell<ViewKey>,
    revision: Cell<u64>,
}

impl<D> ViewOrchestrator<D>
where
    D: ViewDataSource,
{
    pub fn new(source: D, options: OrchestratorOptions) -> Self {
        Self::with_sleeper(source, options, TimerSleeper)
    }

    pub fn with_sleeper(source: D, options: OrchestratorOptions, sleeper: impl Sleeper + 'static) -> Self {
        let slots = ViewKey::ALL
            .into_iter()
            .map(|key| (key, SlotState::default()))
            .collect();
        Self {
            source,
            sleeper: Box::new(sleeper),
            options,
            slots: RefCell::new(slots),
            active: Cell::new(ViewKey::default()),
            revision: Cell::new(0),
        }
    }

    pub fn source(&self) -> &D {
        &self.source
    }

    pub fn revision(&self) -> u64 {
        self.revision.get()
    }

    pub fn active_view(&self) -> ViewKey {
        self.active.get()
    }

    pub fn activate(&self, key: ViewKey) {
        if self.active.replace(key) != key {
            debug!(view = %key, "view activated");
            self.bump();
        }
    }

    pub fn slot(&self, key: ViewKey) -> ViewDataSlot {
        self.slots
            .borrow()
            .get(&key)
            .map(|state| state.slot.clone())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<ViewKey, ViewDataSlot> {
        self.slots
            .borrow()
            .iter()
            .map(|(key, state)| (*key, state.slot.clone()))
            .collect()
    }

    pub async fn fetch_view(&self, key: ViewKey) -> ViewFetchOutcome {
        self.run(key, None).await
    }

    /// 以时间片为范围拉取，供跟随时间游标的面板使用。
    pub async fn fetch_view_at(&self, key: ViewKey, slot_label: &str) -> ViewFetchOutcome {
        self.run(key, Some(slot_label.to_string())).await
    }

    /// 只刷新当前激活的视图，其余视图的数据槽不受影响。
    pub async fn refresh_current_view(&self) -> ViewFetchOutcome {
        let key = self.active_view();
        self.run(key, None).await
    }

    /// 放弃该视图所有在途请求的结果。
    pub fn cancel(&self, key: ViewKey) {
        let mut slots = self.slots.borrow_mut();
        let state = slots.entry(key).or_default();
        state.generation += 1;
        state.slot.loading = false;
        drop(slots);
        self.bump();
    }

    /// 标记 loading 并签发新的代数；旧数据保留以便继续展示。
    pub fn begin(&self, key: ViewKey, scope: Option<String>) -> FetchTicket {
        let mut slots = self.slots.borrow_mut();
        let state = slots.entry(key).or_default();
        state.generation += 1;
        state.slot.loading = true;
        state.slot.error = None;
        let ticket = FetchTicket {
            key,
            generation: state.generation,
            scope,
        };
        drop(slots);
        self.bump();
        ticket
    }

    /// 仅当 ticket 仍是该视图最新一代时才落地结果。
    pub fn settle(&self, ticket: &FetchTicket, result: Result<Value, FetchError>) -> ViewFetchOutcome {
        let mut slots = self.slots.borrow_mut();
        let state = slots.entry(ticket.key).or_default();

        if state.generation != ticket.generation {
            debug!(
                view = %ticket.key,
                stale = ticket.generation,
                current = state.generation,
                "discarding superseded view result"
            );
            return ViewFetchOutcome::Superseded;
        }

        state.slot.loading = false;
        let outcome = match result {
            Ok(data) => {
                state.slot.data = Some(data);
                state.slot.error = None;
                state.slot.scope = ticket.scope.clone();
                ViewFetchOutcome::Applied
            }
            Err(err) => {
                let message = err.to_string();
                if err.is_timeout() {
                    warn!(view = %ticket.key, "view fetch timed out");
                } else {
                    warn!(view = %ticket.key, %message, "view fetch failed");
                }
                state.slot.error = Some(message.clone());
                ViewFetchOutcome::Failed(message)
            }
        };
        drop(slots);
        self.bump();
        outcome
    }

    async fn run(&self, key: ViewKey, scope: Option<String>) -> ViewFetchOutcome {
        let ticket = self.begin(key, scope);
        info!(view = %key, generation = ticket.generation, "fetching view");

        let result = self.fetch_sections(key, ticket.scope.as_deref()).await;
        self.settle(&ticket, result)
    }

    async fn fetch_sections(&self, key: ViewKey, scope: Option<&str>) -> Result<Value, FetchError> {
        let requests = key.sections().iter().copied().map(|section| async move {
            let value = self.source.fetch_section(key, section, scope).await?;
            Ok::<_, FetchError>((section, value))
        });
        let all = future::try_join_all(requests);
        let sections = with_timeout(self.sleeper.as_ref(), self.options.request_timeout, all).await?;
        let merged: Map<String, Value> = sections
            .into_iter()
            .map(|(section, value)| (section.to_string(), value))
            .collect();
        Ok(Value::Object(merged))
    }

    fn bump(&self) {
        self.revision.set(self.revision.get().wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;
    use futures::executor::{block_on, LocalPool};
    use futures::task::LocalSpawnExt;
    use serde_json::json;
    use std::rc::Rc;

    type Reply = oneshot::Sender<Result<Value, FetchError>>;

    #[derive(Default)]
    struct ScriptedSource {
        pending: RefCell<Vec<(ViewKey, &'static str, Option<String>, Reply)>>,
    }

    impl ScriptedSource {
        fn take_pending(&self) -> Vec<(ViewKey, &'static str, Option<String>, Reply)> {
            self.pending.borrow_mut().drain(..).collect()
        }
    }

    impl ViewDataSource for ScriptedSource {
        fn fetch_section<'a>(
            &'a self,
            key: ViewKey,
            section: &'static str,
            scope: Option<&'a str>,
        ) -> LocalBoxFuture<'a, Result<Value, FetchError>> {
            let (tx, rx) = oneshot::channel();
            self.pending
                .borrow_mut()
                .push((key, section, scope.map(str::to_string), tx));
            async move {
                rx.await
                    .unwrap_or_else(|_| Err(FetchError::Rejected("request dropped".into())))
            }
            .boxed_local()
        }
    }

    struct StaticSource;

    impl ViewDataSource for StaticSource {
        fn fetch_section<'a>(
            &'a self,
            key: ViewKey,
            section: &'static str,
            scope: Option<&'a str>,
        ) -> LocalBoxFuture<'a, Result<Value, FetchError>> {
            let value = json!({"view": key.as_str(), "section": section, "scope": scope});
            future::ready(Ok(value)).boxed_local()
        }
    }

    struct FailingSource;

    impl ViewDataSource for FailingSource {
        fn fetch_section<'a>(
            &'a self,
            _key: ViewKey,
            section: &'static str,
            _scope: Option<&'a str>,
        ) -> LocalBoxFuture<'a, Result<Value, FetchError>> {
            if section == "traffic_trend" {
                future::ready(Err(FetchError::Rejected("趋势接口 502".into()))).boxed_local()
            } else {
                future::ready(Ok(json!({}))).boxed_local()
            }
        }
    }

    struct HangingSource;

    impl ViewDataSource for HangingSource {
        fn fetch_section<'a>(
            &'a self,
            _key: ViewKey,
            _section: &'static str,
            _scope: Option<&'a str>,
        ) -> LocalBoxFuture<'a, Result<Value, FetchError>> {
            future::pending().boxed_local()
        }
    }

    struct InstantSleeper;

    impl Sleeper for InstantSleeper {
        fn sleep(&self, _duration: Duration) -> LocalBoxFuture<'static, ()> {
            future::ready(()).boxed_local()
        }
    }

    struct NeverSleeper;

    impl Sleeper for NeverSleeper {
        fn sleep(&self, _duration: Duration) -> LocalBoxFuture<'static, ()> {
            future::pending().boxed_local()
        }
    }

    fn orchestrator<D: ViewDataSource>(source: D) -> ViewOrchestrator<D> {
        ViewOrchestrator::with_sleeper(source, OrchestratorOptions::default(), NeverSleeper)
    }

    fn reply_all(replies: Vec<(ViewKey, &'static str, Option<String>, Reply)>, call: u32) {
        for (_, section, _, tx) in replies {
            let _ = tx.send(Ok(json!({"call": call, "section": section})));
        }
    }

    #[test]
    fn success_merges_sections_into_one_object() {
        let orchestrator = orchestrator(StaticSource);
        let outcome = block_on(orchestrator.fetch_view(ViewKey::CapacityPlanning));
        assert_eq!(outcome, ViewFetchOutcome::Applied);

        let slot = orchestrator.slot(ViewKey::CapacityPlanning);
        assert!(!slot.loading);
        assert!(slot.error.is_none());
        let data = slot.data.unwrap();
        let object = data.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert_eq!(data["hotspots"]["section"], json!("hotspots"));

        // 其他视图不受影响
        assert_eq!(orchestrator.slot(ViewKey::NetworkOverview), ViewDataSlot::default());
    }

    #[test]
    fn failure_keeps_previous_data() {
        let orchestrator = orchestrator(FailingSource);
        let ticket = orchestrator.begin(ViewKey::NetworkOverview, None);
        orchestrator.settle(&ticket, Ok(json!({"summary": {"cells": 12}})));

        let outcome = block_on(orchestrator.fetch_view(ViewKey::NetworkOverview));
        assert_eq!(outcome, ViewFetchOutcome::Failed("趋势接口 502".into()));

        let slot = orchestrator.slot(ViewKey::NetworkOverview);
        assert!(!slot.loading);
        assert_eq!(slot.error.as_deref(), Some("趋势接口 502"));
        assert_eq!(slot.data, Some(json!({"summary": {"cells": 12}})));
    }

    #[test]
    fn loading_keeps_stale_data_and_clears_error() {
        let orchestrator = orchestrator(StaticSource);
        let first = orchestrator.begin(ViewKey::ServiceQuality, None);
        orchestrator.settle(&first, Err(FetchError::Rejected("boom".into())));
        let second = orchestrator.begin(ViewKey::ServiceQuality, None);
        orchestrator.settle(&second, Ok(json!({"kqi": 98})));

        orchestrator.begin(ViewKey::ServiceQuality, None);
        let slot = orchestrator.slot(ViewKey::ServiceQuality);
        assert!(slot.loading);
        assert!(slot.error.is_none());
        assert_eq!(slot.data, Some(json!({"kqi": 98})));
    }

    fn run_overlapping(second_first: bool) -> ViewDataSlot {
        let orchestrator = Rc::new(orchestrator(ScriptedSource::default()));
        let mut pool = LocalPool::new();
        let spawner = pool.spawner();

        for _ in 0..2 {
            let orchestrator = Rc::clone(&orchestrator);
            spawner
                .spawn_local(async move {
                    orchestrator.fetch_view(ViewKey::NetworkOverview).await;
                })
                .unwrap();
        }
        pool.run_until_stalled();

        let mut replies = orchestrator.source().take_pending();
        assert_eq!(replies.len(), 8);
        let second = replies.split_off(4);
        let first = replies;

        if second_first {
            reply_all(second, 2);
            pool.run_until_stalled();
            reply_all(first, 1);
        } else {
            reply_all(first, 1);
            pool.run_until_stalled();
            reply_all(second, 2);
        }
        pool.run_until_stalled();

        orchestrator.slot(ViewKey::NetworkOverview)
    }

    #[test]
    fn last_initiated_fetch_wins_regardless_of_arrival_order() {
        for second_first in [true, false] {
            let slot = run_overlapping(second_first);
            assert!(!slot.loading);
            assert!(slot.error.is_none());
            let data = slot.data.unwrap();
            for section in ViewKey::NetworkOverview.sections() {
                assert_eq!(data[*section]["call"], json!(2), "section {section}");
            }
        }
    }

    #[test]
    fn late_failure_of_superseded_call_is_ignored() {
        let orchestrator = orchestrator(StaticSource);
        let stale = orchestrator.begin(ViewKey::RegionMap, None);
        let fresh = orchestrator.begin(ViewKey::RegionMap, None);

        assert_eq!(
            orchestrator.settle(&fresh, Ok(json!({"regions": []}))),
            ViewFetchOutcome::Applied
        );
        assert_eq!(
            orchestrator.settle(&stale, Err(FetchError::Rejected("late".into()))),
            ViewFetchOutcome::Superseded
        );
        let slot = orchestrator.slot(ViewKey::RegionMap);
        assert!(slot.error.is_none());
        assert_eq!(slot.data, Some(json!({"regions": []})));
    }

    #[test]
    fn timeout_is_reported_distinctly() {
        let orchestrator = ViewOrchestrator::with_sleeper(
            HangingSource,
            OrchestratorOptions {
                request_timeout: Duration::from_millis(30_000),
            },
            InstantSleeper,
        );
        let outcome = block_on(orchestrator.fetch_view(ViewKey::ServiceQuality));
        assert_eq!(outcome, ViewFetchOutcome::Failed("请求超时（30000ms）".into()));
        assert!(FetchError::Timeout {
            after: Duration::from_secs(1)
        }
        .is_timeout());
        assert!(!FetchError::Rejected("x".into()).is_timeout());
    }

    #[test]
    fn standalone_requests_share_the_timeout_race() {
        let hung = with_timeout(
            &InstantSleeper,
            Duration::from_millis(30_000),
            future::pending::<Result<Vec<u32>, FetchError>>(),
        );
        let err = block_on(hung).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "请求超时（30000ms）");

        let ready = with_timeout(&NeverSleeper, Duration::from_millis(10), async { Ok(vec![1, 2]) });
        assert_eq!(block_on(ready).unwrap(), vec![1, 2]);
    }

    #[test]
    fn scoped_fetch_passes_time_slot() {
        let orchestrator = orchestrator(StaticSource);
        block_on(orchestrator.fetch_view_at(ViewKey::RegionMap, "14:00"));
        let slot = orchestrator.slot(ViewKey::RegionMap);
        assert_eq!(slot.scope.as_deref(), Some("14:00"));
        assert_eq!(slot.data.unwrap()["links"]["scope"], json!("14:00"));
    }

    #[test]
    fn refresh_targets_only_active_view() {
        let orchestrator = orchestrator(StaticSource);
        orchestrator.activate(ViewKey::ServiceQuality);
        block_on(orchestrator.refresh_current_view());

        let snapshot = orchestrator.snapshot();
        assert!(snapshot[&ViewKey::ServiceQuality].data.is_some());
        for key in [ViewKey::NetworkOverview, ViewKey::CapacityPlanning, ViewKey::RegionMap] {
            assert_eq!(snapshot[&key], ViewDataSlot::default());
        }
    }

    #[test]
    fn cancel_discards_in_flight_results() {
        let orchestrator = orchestrator(StaticSource);
        let ticket = orchestrator.begin(ViewKey::CapacityPlanning, None);
        orchestrator.cancel(ViewKey::CapacityPlanning);
        assert!(!orchestrator.slot(ViewKey::CapacityPlanning).loading);
        assert_eq!(
            orchestrator.settle(&ticket, Ok(json!({}))),
            ViewFetchOutcome::Superseded
        );
        assert!(orchestrator.slot(ViewKey::CapacityPlanning).data.is_none());
    }
}
