//! 浏览器端的 WebSocket 传输与重连计时器。
//!
//! 两者都只把事件转交给外部注册的 sink，由宿主决定何时回调
//! [`RealtimeSession`](super::RealtimeSession)。非 wasm 平台只保留空壳，便于原生编译与测试。

use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use super::connection::{Scheduler, TimerToken, Transport, TransportError, TransportEvent};

pub type SocketEventSink = Rc<dyn Fn(TransportEvent)>;
pub type TimerSink = Rc<dyn Fn(TimerToken)>;

#[derive(Default)]
pub struct WebSocketTransport {
    sink: Option<SocketEventSink>,
    #[cfg(target_arch = "wasm32")]
    runtime: Option<wasm::SocketRuntime>,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sink(&mut self, sink: SocketEventSink) {
        self.sink = Some(sink);
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, endpoint: &str) -> Result<(), TransportError> {
        if endpoint.trim().is_empty() {
            return Err(TransportError::Open("URL 为空".into()));
        }

        #[cfg(target_arch = "wasm32")]
        {
            let Some(sink) = self.sink.clone() else {
                return Err(TransportError::Open("事件回调未注册".into()));
            };
            self.runtime = None;
            let runtime = wasm::SocketRuntime::connect(endpoint, sink)?;
            self.runtime = Some(runtime);
            Ok(())
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = &self.sink;
            Err(TransportError::Unsupported(
                "仅 wasm32 目标支持 WebSocket".into(),
            ))
        }
    }

    fn send_text(&mut self, text: &str) -> Result<(), TransportError> {
        #[cfg(target_arch = "wasm32")]
        {
            match self.runtime.as_ref() {
                Some(runtime) => runtime.send(text),
                None => Err(TransportError::Send("连接不存在".into())),
            }
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = text;
            Err(TransportError::Unsupported(
                "仅 wasm32 目标支持 WebSocket".into(),
            ))
        }
    }

    fn close(&mut self) {
        #[cfg(target_arch = "wasm32")]
        {
            // Drop 会卸载回调再关闭，旧连接不会再投递事件
            self.runtime = None;
        }
        debug!("websocket transport closed");
    }
}

#[derive(Default)]
pub struct TimeoutScheduler {
    sink: Option<TimerSink>,
    #[cfg(target_arch = "wasm32")]
    timers: std::collections::HashMap<TimerToken, gloo_timers::callback::Timeout>,
}

impl TimeoutScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sink(&mut self, sink: TimerSink) {
        self.sink = Some(sink);
    }
}

impl Scheduler for TimeoutScheduler {
    fn schedule(&mut self, token: TimerToken, delay: Duration) {
        #[cfg(target_arch = "wasm32")]
        {
            let Some(sink) = self.sink.clone() else {
                tracing::warn!("reconnect timer dropped, no sink registered");
                return;
            };
            let millis = delay.as_millis().min(u32::MAX as u128) as u32;
            let timer = gloo_timers::callback::Timeout::new(millis, move || sink(token));
            // 同一时刻最多一个挂起的重连计时器
            self.timers.clear();
            self.timers.insert(token, timer);
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = &self.sink;
            debug!(
                token = token.value(),
                delay_ms = delay.as_millis() as u64,
                "reconnect timers are not driven on this platform"
            );
        }
    }

    fn cancel(&mut self, token: TimerToken) {
        #[cfg(target_arch = "wasm32")]
        {
            if let Some(timer) = self.timers.remove(&token) {
                timer.cancel();
            }
        }

        debug!(token = token.value(), "reconnect timer cancelled");
    }
}

#[cfg(target_arch = "wasm32")]
mod wasm {
    use std::cell::Cell;
    use std::rc::Rc;

    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::{JsCast, JsValue};
    use web_sys::{CloseEvent, Event, MessageEvent, WebSocket};

    use super::{SocketEventSink, TransportError, TransportEvent};

    pub struct SocketRuntime {
        ws: WebSocket,
        closing: Rc<Cell<bool>>,
        _on_open: Closure<dyn FnMut(Event)>,
        _on_message: Closure<dyn FnMut(MessageEvent)>,
        _on_close: Closure<dyn FnMut(CloseEvent)>,
        _on_error: Closure<dyn FnMut(Event)>,
    }

    impl SocketRuntime {
        pub fn connect(url: &str, sink: SocketEventSink) -> Result<Self, TransportError> {
            tracing::info!(%url, "opening websocket");
            let ws = WebSocket::new(url)
                .map_err(|err| TransportError::Open(js_value_to_string(&err)))?;

            let closing = Rc::new(Cell::new(false));

            let open_sink = Rc::clone(&sink);
            let on_open = Closure::wrap(Box::new(move |_evt: Event| {
                open_sink(TransportEvent::Opened);
            }) as Box<dyn FnMut(Event)>);
            ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));

            let message_sink = Rc::clone(&sink);
            let on_message = Closure::wrap(Box::new(move |evt: MessageEvent| {
                let data = evt.data();
                let text = match data.as_string() {
                    Some(text) => text,
                    None => js_sys::JSON::stringify(&data)
                        .ok()
                        .and_then(|js| js.as_string())
                        .unwrap_or_default(),
                };
                message_sink(TransportEvent::Message(text));
            }) as Box<dyn FnMut(MessageEvent)>);
            ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

            let close_sink = Rc::clone(&sink);
            let closing_for_close = Rc::clone(&closing);
            let on_close = Closure::wrap(Box::new(move |evt: CloseEvent| {
                if closing_for_close.get() {
                    return;
                }
                tracing::info!(code = evt.code(), reason = %evt.reason(), "websocket closed");
                close_sink(TransportEvent::Closed);
            }) as Box<dyn FnMut(CloseEvent)>);
            ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));

            let error_sink = sink;
            let on_error = Closure::wrap(Box::new(move |evt: Event| {
                let detail = evt.type_();
                error_sink(TransportEvent::Error(format!("WebSocket 错误: {detail}")));
            }) as Box<dyn FnMut(Event)>);
            ws.set_onerror(Some(on_error.as_ref().unchecked_ref()));

            Ok(Self {
                ws,
                closing,
                _on_open: on_open,
                _on_message: on_message,
                _on_close: on_close,
                _on_error: on_error,
            })
        }

        pub fn send(&self, text: &str) -> Result<(), TransportError> {
            self.ws
                .send_with_str(text)
                .map_err(|err| TransportError::Send(js_value_to_string(&err)))
        }
    }

    impl Drop for SocketRuntime {
        fn drop(&mut self) {
            self.closing.set(true);
            self.ws.set_onopen(None);
            self.ws.set_onmessage(None);
            self.ws.set_onerror(None);
            self.ws.set_onclose(None);
            let _ = self.ws.close();
        }
    }

    fn js_value_to_string(value: &JsValue) -> String {
        if let Some(text) = value.as_string() {
            return text;
        }
        js_sys::JSON::stringify(value)
            .ok()
            .and_then(|js| js.as_string())
            .unwrap_or_else(|| "未知错误".into())
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn native_transport_reports_unsupported() {
        let mut transport = WebSocketTransport::new();
        assert!(matches!(
            transport.open("ws://localhost/ws"),
            Err(TransportError::Unsupported(_))
        ));
        assert!(matches!(
            transport.open("  "),
            Err(TransportError::Open(_))
        ));
        assert!(transport.send_text("{}").is_err());
        transport.close();
    }
}
