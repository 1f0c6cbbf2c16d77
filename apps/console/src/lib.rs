//! NetPulse 控制台的实时同步核心。
//!
//! 连接管理、消息路由、告警集合、视图数据编排与时间游标都不依赖 Dioxus，
//! 可在原生平台直接测试；浏览器相关的部分集中在 [`realtime::socket`]。

pub mod alerts;
pub mod api;
pub mod config;
pub mod fixtures;
pub mod models;
pub mod realtime;
pub mod state;
pub mod time_cursor;
pub mod views;
