use std::cell::RefCell;
use std::rc::{Rc, Weak};

use dioxus::prelude::*;
use serde_json::Value;
use tracing::{info, warn};

use netpulse_console::config::AppConfig;
use netpulse_console::models::AlertRecord;
use netpulse_console::realtime::socket::{
    SocketEventSink, TimeoutScheduler, TimerSink, WebSocketTransport,
};
use netpulse_console::realtime::{ConnectionCallbacks, OutboundMessage, RealtimeSession};
#[cfg(target_arch = "wasm32")]
use netpulse_console::views::{with_timeout, FetchError, TimerSleeper};

use super::{use_app_actions, AppActions};
use crate::{API_CLIENT, APP_CONFIG};

pub type LiveSession = RealtimeSession<WebSocketTransport, TimeoutScheduler>;

/// 浏览器事件与 UI 操作都经由这里进入 [`RealtimeSession`]，每次调用后同步快照。
#[derive(Clone)]
pub struct RealtimeHandle {
    session: Rc<RefCell<LiveSession>>,
    actions: AppActions,
}

impl PartialEq for RealtimeHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.session, &other.session)
    }
}

impl RealtimeHandle {
    fn new(config: &AppConfig, actions: AppActions) -> Self {
        let session = Rc::new(RefCell::new(RealtimeSession::new(
            WebSocketTransport::new(),
            TimeoutScheduler::new(),
            config.connection_options(),
            config.alert_capacity,
        )));

        let handle = Self { session, actions };
        handle.wire(Rc::downgrade(&handle.session));
        handle
    }

    fn wire(&self, weak: Weak<RefCell<LiveSession>>) {
        let actions = self.actions;

        let event_weak = weak.clone();
        let event_sink: SocketEventSink = Rc::new(move |event| {
            let weak = event_weak.clone();
            dispatch(move || {
                let Some(session) = weak.upgrade() else {
                    return;
                };
                session.borrow_mut().handle_event(event);
                actions.sync_realtime(&session.borrow());
            });
        });

        let timer_sink: TimerSink = Rc::new(move |token| {
            let weak = weak.clone();
            dispatch(move || {
                let Some(session) = weak.upgrade() else {
                    return;
                };
                session.borrow_mut().handle_timer(token);
                actions.sync_realtime(&session.borrow());
            });
        });

        let mut session = self.session.borrow_mut();
        let connection = session.connection_mut();
        connection.transport_mut().set_sink(event_sink);
        connection.scheduler_mut().set_sink(timer_sink);
        connection.set_callbacks(ConnectionCallbacks::new(
            || info!("alert stream connected"),
            || info!("alert stream disconnected"),
            |message| warn!(%message, "alert stream error"),
        ));
        session
            .router_mut()
            .register_metrics(move |payload: &Value| actions.record_metrics(payload.clone()));
    }

    fn with_session<R>(&self, f: impl FnOnce(&mut LiveSession) -> R) -> R {
        let result = f(&mut self.session.borrow_mut());
        self.actions.sync_realtime(&self.session.borrow());
        result
    }

    pub fn connect(&self) {
        self.with_session(|session| session.connect());
    }

    pub fn disconnect(&self) {
        self.with_session(|session| session.disconnect());
    }

    /// 仅在连接打开时成功；断线时记录日志并返回 false。
    pub fn send(&self, text: &str) -> bool {
        self.with_session(|session| session.send(text))
    }

    /// 按配置的频道重发订阅，用于服务端重启后丢失订阅的情况。
    pub fn resubscribe(&self) -> bool {
        let channels = APP_CONFIG
            .get()
            .map(|config| config.channels.clone())
            .unwrap_or_default();
        match OutboundMessage::subscribe(channels).to_text() {
            Ok(text) => self.send(&text),
            Err(err) => {
                warn!(%err, "failed to encode subscription");
                false
            }
        }
    }

    pub fn mark_read(&self, id: &str) {
        self.with_session(|session| session.mark_read(id));
    }

    pub fn mark_all_read(&self) {
        self.with_session(|session| session.mark_all_read());
    }

    pub fn clear_alerts(&self) {
        self.with_session(|session| session.clear_alerts());
    }

    pub fn load_history(&self, records: Vec<AlertRecord>) {
        let size = self.with_session(|session| session.merge_history(records));
        info!(size, "alert history loaded");
    }
}

/// 浏览器回调推迟到下一个微任务执行，避免与正在进行的 `borrow_mut` 重入。
fn dispatch(task: impl FnOnce() + 'static) {
    #[cfg(target_arch = "wasm32")]
    {
        wasm_bindgen_futures::spawn_local(async move { task() });
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        task();
    }
}

/// 在根组件调用一次：建立会话，按配置自动连接，随后载入历史告警。
/// 历史请求带超时，挂起或失败都不影响实时连接。
pub fn use_realtime_provider() -> RealtimeHandle {
    let actions = use_app_actions();

    let handle = use_hook(|| {
        let config = APP_CONFIG.get().cloned().unwrap_or_default();
        RealtimeHandle::new(&config, actions)
    });
    use_context_provider(|| handle.clone());

    let bootstrap = handle.clone();
    use_future(move || {
        let handle = bootstrap.clone();
        async move {
            let auto_connect = APP_CONFIG.get().map(|c| c.auto_connect).unwrap_or(true);
            if auto_connect {
                handle.connect();
            }
            handle.load_history(initial_history().await);
        }
    });

    handle
}

pub fn use_realtime() -> RealtimeHandle {
    use_context::<RealtimeHandle>()
}

#[cfg(target_arch = "wasm32")]
async fn initial_history() -> Vec<AlertRecord> {
    let Some(client) = API_CLIENT.get().cloned() else {
        warn!("api client missing, starting with empty alert history");
        return Vec::new();
    };
    let timeout = client.config().request_timeout;
    let request = async { client.fetch_alert_history().await.map_err(FetchError::from) };
    match with_timeout(&TimerSleeper, timeout, request).await {
        Ok(records) => records,
        Err(err) if err.is_timeout() => {
            warn!(%err, "alert history timed out");
            Vec::new()
        }
        Err(err) => {
            warn!(%err, "failed to load alert history");
            Vec::new()
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
async fn initial_history() -> Vec<AlertRecord> {
    let _ = API_CLIENT.get();
    netpulse_console::fixtures::sample_alerts()
}
