pub mod alerts;
pub mod connection;
pub mod notifications;
pub mod playback;
pub mod views;
