use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionOptions;
use crate::realtime::protocol::{parse_frame, Envelope, MessageKind, OutboundMessage};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("连接初始化失败: {0}")]
    Open(String),
    #[error("发送失败: {0}")]
    Send(String),
    #[error("当前平台不支持: {0}")]
    Unsupported(String),
}

/// 物理双工通道。实现方只负责收发，状态与重连全部由 [`ConnectionManager`] 决定；
/// 通道上的 open/message/close/error 事件由宿主转交给管理器的 `handle_*` 方法。
pub trait Transport {
    fn open(&mut self, endpoint: &str) -> Result<(), TransportError>;
    fn send_text(&mut self, text: &str) -> Result<(), TransportError>;
    fn close(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl TimerToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// 重连计时器宿主。到期后宿主调用 [`ConnectionManager::handle_timer`]，
/// 过期的 token 会被忽略。
pub trait Scheduler {
    fn schedule(&mut self, token: TimerToken, delay: Duration);
    fn cancel(&mut self, token: TimerToken);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed,
    Error(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
    Errored,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "未连接",
            Self::Connecting => "连接中",
            Self::Open => "已连接",
            Self::Closed => "已断开",
            Self::Errored => "连接异常",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub attempts: u32,
    pub manual_close: bool,
    pub reconnect_pending: bool,
    /// 自动重连次数已用尽，需要人工重新连接。
    pub exhausted: bool,
    pub last_error: Option<String>,
    pub connected_since: Option<OffsetDateTime>,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

pub struct ConnectionCallbacks {
    pub on_connect: Box<dyn FnMut() + 'static>,
    pub on_disconnect: Box<dyn FnMut() + 'static>,
    pub on_error: Box<dyn FnMut(&str) + 'static>,
}

impl ConnectionCallbacks {
    pub fn new(
        on_connect: impl FnMut() + 'static,
        on_disconnect: impl FnMut() + 'static,
        on_error: impl FnMut(&str) + 'static,
    ) -> Self {
        Self {
            on_connect: Box::new(on_connect),
            on_disconnect: Box::new(on_disconnect),
            on_error: Box::new(on_error),
        }
    }
}

impl Default for ConnectionCallbacks {
    fn default() -> Self {
        Self::new(|| {}, || {}, |_| {})
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    /// PING 已直接回复 PONG，不进入路由。
    Heartbeat,
    Deliver(Envelope),
    Dropped,
}

/// 单连接状态机：`Idle → Connecting → Open → Closed → (重连) → Connecting …`。
///
/// 任意时刻最多一个存活的物理连接，最多一个挂起的重连计时器。
/// 只有 close 事件会触发重连，error 事件只记录。
pub struct ConnectionManager<T, S> {
    transport: T,
    scheduler: S,
    options: ConnectionOptions,
    callbacks: ConnectionCallbacks,
    state: ConnectionState,
    attempts: u32,
    manual_close: bool,
    exhausted: bool,
    live: bool,
    pending_timer: Option<TimerToken>,
    next_token: u64,
    last_error: Option<String>,
    connected_since: Option<OffsetDateTime>,
}

impl<T, S> ConnectionManager<T, S>
where
    T: Transport,
    S: Scheduler,
{
    pub fn new(transport: T, scheduler: S, options: ConnectionOptions) -> Self {
        Self {
            transport,
            scheduler,
            options,
            callbacks: ConnectionCallbacks::default(),
            state: ConnectionState::Idle,
            attempts: 0,
            manual_close: false,
            exhausted: false,
            live: false,
            pending_timer: None,
            next_token: 0,
            last_error: None,
            connected_since: None,
        }
    }

    pub fn with_callbacks(mut self, callbacks: ConnectionCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn set_callbacks(&mut self, callbacks: ConnectionCallbacks) {
        self.callbacks = callbacks;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            attempts: self.attempts,
            manual_close: self.manual_close,
            reconnect_pending: self.pending_timer.is_some(),
            exhausted: self.exhausted,
            last_error: self.last_error.clone(),
            connected_since: self.connected_since,
        }
    }

    /// 已处于 Open 时为空操作；否则先拆掉旧连接再建立新连接。
    /// 人工调用会清空重连计数，让耗尽后的管理器重新获得自动重连能力。
    pub fn connect(&mut self, endpoint: impl Into<String>, channels: Vec<String>) {
        if self.state == ConnectionState::Open {
            debug!("connect ignored, connection already open");
            return;
        }

        self.options.endpoint = endpoint.into();
        self.options.channels = channels;
        self.manual_close = false;
        self.exhausted = false;
        self.attempts = 0;
        self.cancel_pending_timer();
        self.open_transport();
    }

    /// 使用当前配置中的地址和订阅主题连接。
    pub fn connect_default(&mut self) {
        let endpoint = self.options.endpoint.clone();
        let channels = self.options.channels.clone();
        self.connect(endpoint, channels);
    }

    /// 人工断开：终止态，直到再次调用 `connect`。
    pub fn disconnect(&mut self) {
        self.manual_close = true;
        self.cancel_pending_timer();
        if self.live {
            self.live = false;
            self.transport.close();
        }
        self.state = ConnectionState::Closed;
        self.connected_since = None;
        info!("realtime connection closed manually");
    }

    /// 仅在 Open 状态下发送；失败只记日志并返回 false，不向调用方抛错。
    pub fn send(&mut self, text: &str) -> bool {
        if self.state != ConnectionState::Open || !self.live {
            warn!(state = ?self.state, "send skipped, connection not open");
            return false;
        }
        match self.transport.send_text(text) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "send failed");
                false
            }
        }
    }

    pub fn send_json(&mut self, message: &OutboundMessage) -> bool {
        match message.to_text() {
            Ok(text) => self.send(&text),
            Err(err) => {
                warn!(%err, "outbound message dropped");
                false
            }
        }
    }

    /// 统一入口：生命周期事件就地处理，业务消息交还调用方路由。
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<Envelope> {
        match event {
            TransportEvent::Opened => self.handle_open(),
            TransportEvent::Message(text) => {
                if let FrameOutcome::Deliver(envelope) = self.handle_frame(&text) {
                    return Some(envelope);
                }
            }
            TransportEvent::Closed => self.handle_close(),
            TransportEvent::Error(message) => self.handle_error(&message),
        }
        None
    }

    pub fn handle_open(&mut self) {
        if !self.live {
            debug!("open event for inactive connection ignored");
            return;
        }

        self.state = ConnectionState::Open;
        self.attempts = 0;
        self.exhausted = false;
        self.last_error = None;
        self.connected_since = Some(OffsetDateTime::now_utc());
        info!(endpoint = %self.options.endpoint, "realtime connection open");

        let subscribe = OutboundMessage::subscribe(self.options.channels.iter().cloned());
        if !self.send_json(&subscribe) {
            warn!("subscription message could not be sent");
        }

        (self.callbacks.on_connect)();
    }

    /// 非人工关闭：进入 Closed，未超过上限时排一次重连。
    pub fn handle_close(&mut self) {
        if !self.live {
            debug!("close event for inactive connection ignored");
            return;
        }
        self.live = false;
        self.after_unexpected_close();
    }

    /// 错误本身不触发重连，随后的 close 事件才会。
    pub fn handle_error(&mut self, message: &str) {
        error!(%message, "realtime transport error");
        self.state = ConnectionState::Errored;
        self.last_error = Some(message.to_string());
        (self.callbacks.on_error)(message);
    }

    /// 心跳在这里直接回复，不经过路由。
    pub fn handle_frame(&mut self, text: &str) -> FrameOutcome {
        let envelope = match parse_frame(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%err, "dropping malformed frame");
                return FrameOutcome::Dropped;
            }
        };

        if envelope.kind == MessageKind::Ping {
            self.reply_pong();
            return FrameOutcome::Heartbeat;
        }

        FrameOutcome::Deliver(envelope)
    }

    pub fn handle_timer(&mut self, token: TimerToken) {
        if self.pending_timer != Some(token) {
            debug!(token = token.value(), "stale reconnect timer ignored");
            return;
        }
        self.pending_timer = None;

        if self.manual_close {
            return;
        }

        info!(attempt = self.attempts, "reconnecting");
        self.open_transport();
    }

    fn open_transport(&mut self) {
        if self.live {
            self.live = false;
            self.transport.close();
        }

        self.state = ConnectionState::Connecting;
        self.connected_since = None;

        match self.transport.open(&self.options.endpoint) {
            Ok(()) => {
                self.live = true;
            }
            Err(err) => {
                let message = err.to_string();
                self.handle_error(&message);
                self.after_unexpected_close();
            }
        }
    }

    fn after_unexpected_close(&mut self) {
        self.state = ConnectionState::Closed;
        self.connected_since = None;

        if self.manual_close {
            return;
        }

        (self.callbacks.on_disconnect)();

        if self.attempts < self.options.max_reconnect_attempts {
            self.attempts += 1;
            let token = self.allocate_token();
            self.pending_timer = Some(token);
            self.scheduler
                .schedule(token, self.options.reconnect_interval);
            info!(
                attempt = self.attempts,
                max = self.options.max_reconnect_attempts,
                delay_ms = self.options.reconnect_interval.as_millis() as u64,
                "connection lost, reconnect scheduled"
            );
        } else {
            self.exhausted = true;
            warn!(
                attempts = self.attempts,
                "reconnect attempts exhausted, waiting for manual connect"
            );
        }
    }

    fn reply_pong(&mut self) {
        if !self.live {
            return;
        }
        match OutboundMessage::Pong.to_text() {
            Ok(text) => {
                if let Err(err) = self.transport.send_text(&text) {
                    warn!(%err, "pong reply failed");
                }
            }
            Err(err) => warn!(%err, "pong encode failed"),
        }
    }

    fn cancel_pending_timer(&mut self) {
        if let Some(token) = self.pending_timer.take() {
            self.scheduler.cancel(token);
        }
    }

    fn allocate_token(&mut self) -> TimerToken {
        self.next_token += 1;
        TimerToken(self.next_token)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    #[derive(Debug, Default)]
    pub struct RecordingTransport {
        pub opened: Vec<String>,
        pub sent: Vec<String>,
        pub closes: usize,
        pub fail_open: bool,
        pub fail_send: bool,
    }

    impl Transport for RecordingTransport {
        fn open(&mut self, endpoint: &str) -> Result<(), TransportError> {
            if self.fail_open {
                return Err(TransportError::Open("refused".into()));
            }
            self.opened.push(endpoint.to_string());
            Ok(())
        }

        fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
            if self.fail_send {
                return Err(TransportError::Send("buffer full".into()));
            }
            self.sent.push(text.to_string());
            Ok(())
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    #[derive(Debug, Default)]
    pub struct ManualScheduler {
        pub scheduled: Vec<(TimerToken, Duration)>,
        pub cancelled: Vec<TimerToken>,
    }

    impl ManualScheduler {
        pub fn last_token(&self) -> Option<TimerToken> {
            self.scheduled.last().map(|(token, _)| *token)
        }
    }

    impl Scheduler for ManualScheduler {
        fn schedule(&mut self, token: TimerToken, delay: Duration) {
            self.scheduled.push((token, delay));
        }

        fn cancel(&mut self, token: TimerToken) {
            self.cancelled.push(token);
        }
    }

    pub fn options() -> ConnectionOptions {
        ConnectionOptions {
            endpoint: "ws://localhost:8080/ws/alerts".into(),
            channels: vec!["alerts".into(), "metrics".into()],
            reconnect_interval: Duration::from_millis(3_000),
            max_reconnect_attempts: 5,
        }
    }

    pub fn manager() -> ConnectionManager<RecordingTransport, ManualScheduler> {
        ConnectionManager::new(
            RecordingTransport::default(),
            ManualScheduler::default(),
            options(),
        )
    }
}
