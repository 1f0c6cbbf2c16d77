//! 共享时间游标与播放控制。
//!
//! 游标只有一个记录值，写入方式分两种：播放控件自身推进（Internal），
//! 以及其他面板直接推送的权威时间（External）。控件收到外部推送时只做
//! 对齐，不再发出自己的变更事件，互相订阅的面板之间因此不会来回震荡。

use std::fmt;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::config::PlaybackOptions;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComponentId(Uuid);

impl ComponentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimeSlots {
    labels: Vec<String>,
}

impl TimeSlots {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// 默认的 24 个整点时间片：00:00 ~ 23:00。
    pub fn hourly() -> Self {
        Self::new((0..24).map(|hour| format!("{hour:02}:00")).collect())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn last_index(&self) -> usize {
        self.labels.len().saturating_sub(1)
    }

    pub fn clamp(&self, index: usize) -> usize {
        index.min(self.last_index())
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        let label = label.trim();
        self.labels.iter().position(|candidate| candidate == label)
    }

    /// 按时刻就近落到某个时间片；越过两端的值夹到首尾，距离相等取较早的一格。
    /// 无法解析为 `HH:MM` 的标签只接受精确匹配。
    pub fn nearest(&self, label: &str) -> Option<usize> {
        if let Some(index) = self.index_of(label) {
            return Some(index);
        }
        let target = parse_minutes(label)?;
        self.labels
            .iter()
            .enumerate()
            .filter_map(|(index, candidate)| {
                parse_minutes(candidate).map(|minutes| (minutes.abs_diff(target), index))
            })
            .min()
            .map(|(_, index)| index)
    }
}

fn parse_minutes(label: &str) -> Option<u32> {
    let (hours, minutes) = label.trim().split_once(':')?;
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    hours.checked_mul(60)?.checked_add(minutes)
}

impl Default for TimeSlots {
    fn default() -> Self {
        Self::hourly()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    Internal,
    External,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeUpdate {
    pub index: usize,
    pub source: UpdateSource,
    pub origin: ComponentId,
}

impl TimeUpdate {
    pub fn internal(origin: ComponentId, index: usize) -> Self {
        Self {
            index,
            source: UpdateSource::Internal,
            origin,
        }
    }

    pub fn external(origin: ComponentId, index: usize) -> Self {
        Self {
            index,
            source: UpdateSource::External,
            origin,
        }
    }
}

/// 游标的记录值，最后一次写入为准。
#[derive(Clone, Debug)]
pub struct TimeCursor {
    slots: TimeSlots,
    index: usize,
    version: u64,
    last_update: Option<TimeUpdate>,
}

impl TimeCursor {
    pub fn new(slots: TimeSlots) -> Self {
        Self {
            slots,
            index: 0,
            version: 0,
            last_update: None,
        }
    }

    pub fn slots(&self) -> &TimeSlots {
        &self.slots
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> Option<&str> {
        self.slots.label(self.index)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn last_update(&self) -> Option<&TimeUpdate> {
        self.last_update.as_ref()
    }

    /// 写入一次更新，越界索引被夹到末尾。值未变化时不记账，返回 `None`；
    /// 变化时返回应广播给订阅方的更新。
    pub fn write(&mut self, update: TimeUpdate) -> Option<TimeUpdate> {
        if self.slots.is_empty() {
            return None;
        }
        let index = self.slots.clamp(update.index);
        if index == self.index && self.last_update.is_some() {
            return None;
        }
        let update = TimeUpdate { index, ..update };
        self.index = index;
        self.version += 1;
        self.last_update = Some(update.clone());
        debug!(
            index,
            source = ?update.source,
            origin = %update.origin,
            "time cursor moved"
        );
        Some(update)
    }

    /// 其他面板按标签推送权威时间，域外的时刻夹到最近的时间片；无法解析的标签被忽略。
    pub fn push_external(&mut self, origin: ComponentId, label: &str) -> Option<TimeUpdate> {
        let index = self.slots.nearest(label)?;
        self.write(TimeUpdate::external(origin, index))
    }
}

impl Default for TimeCursor {
    fn default() -> Self {
        Self::new(TimeSlots::default())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackState {
    pub index: usize,
    pub playing: bool,
}

/// 单个播放控件：本地索引 + 自动播放开关。
///
/// 所有改变索引的操作返回 `Option<TimeUpdate>`，`Some` 表示需要写入共享游标。
/// 手动操作 (next/prev/reset/seek) 会先停掉自动播放。
#[derive(Clone, Debug)]
pub struct PlaybackController {
    id: ComponentId,
    len: usize,
    index: usize,
    playing: bool,
    options: PlaybackOptions,
}

impl PlaybackController {
    pub fn new(slots: &TimeSlots, options: PlaybackOptions) -> Self {
        Self {
            id: ComponentId::new(),
            len: slots.len(),
            index: 0,
            playing: false,
            options,
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn options(&self) -> &PlaybackOptions {
        &self.options
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            index: self.index,
            playing: self.playing,
        }
    }

    fn last_index(&self) -> usize {
        self.len.saturating_sub(1)
    }

    fn at_end(&self) -> bool {
        self.index >= self.last_index()
    }

    /// 已在末尾时不启动，返回 false。
    pub fn play(&mut self) -> bool {
        if self.playing || self.len == 0 || self.at_end() {
            return false;
        }
        self.playing = true;
        debug!(component = %self.id, index = self.index, "playback started");
        true
    }

    pub fn pause(&mut self) {
        if self.playing {
            self.playing = false;
            debug!(component = %self.id, index = self.index, "playback paused");
        }
    }

    pub fn toggle(&mut self) -> bool {
        if self.playing {
            self.pause();
            false
        } else {
            self.play()
        }
    }

    /// 自动播放的一拍：前进一格，到达末尾即停止，不回绕。
    pub fn tick(&mut self) -> Option<TimeUpdate> {
        if !self.playing {
            return None;
        }
        if self.at_end() {
            self.playing = false;
            return None;
        }
        self.index += 1;
        if self.at_end() {
            self.playing = false;
            debug!(component = %self.id, "playback reached the last slot");
        }
        Some(self.emit())
    }

    pub fn next(&mut self) -> Option<TimeUpdate> {
        self.pause();
        if self.len == 0 || self.at_end() {
            return None;
        }
        self.index += 1;
        Some(self.emit())
    }

    pub fn prev(&mut self) -> Option<TimeUpdate> {
        self.pause();
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        Some(self.emit())
    }

    pub fn reset(&mut self) -> Option<TimeUpdate> {
        self.seek(0)
    }

    /// 滑块拖动。
    pub fn seek(&mut self, index: usize) -> Option<TimeUpdate> {
        self.pause();
        if self.len == 0 {
            return None;
        }
        let index = index.min(self.last_index());
        if index == self.index {
            return None;
        }
        self.index = index;
        Some(self.emit())
    }

    /// 对齐到共享游标上的更新。自己发出的更新直接忽略；
    /// 来自别处的更新只改本地索引，不产生新的事件。返回本地索引是否变化。
    pub fn observe(&mut self, update: &TimeUpdate) -> bool {
        if update.origin == self.id || self.len == 0 {
            return false;
        }
        let index = update.index.min(self.last_index());
        if index == self.index {
            return false;
        }
        self.index = index;
        if self.playing && self.at_end() {
            self.playing = false;
        }
        true
    }

    fn emit(&self) -> TimeUpdate {
        TimeUpdate::internal(self.id, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> PlaybackController {
        PlaybackController::new(&TimeSlots::hourly(), PlaybackOptions::default())
    }

    #[test]
    fn hourly_slots_cover_the_day() {
        let slots = TimeSlots::hourly();
        assert_eq!(slots.len(), 24);
        assert_eq!(slots.label(0), Some("00:00"));
        assert_eq!(slots.label(23), Some("23:00"));
        assert_eq!(slots.index_of(" 14:00 "), Some(14));
        assert_eq!(slots.clamp(99), 23);
    }

    #[test]
    fn autoplay_stops_at_upper_bound_without_wrapping() {
        let mut playback = controller();
        playback.seek(20);
        assert!(playback.play());

        let mut emitted = Vec::new();
        for _ in 0..10 {
            if let Some(update) = playback.tick() {
                emitted.push(update.index);
            }
        }
        assert_eq!(emitted, vec![21, 22, 23]);
        assert!(!playback.is_playing());
        assert_eq!(playback.index(), 23);
        assert!(!playback.play());
    }

    #[test]
    fn manual_interaction_stops_autoplay() {
        let mut playback = controller();
        let manual: [fn(&mut PlaybackController) -> Option<TimeUpdate>; 4] = [
            PlaybackController::next,
            PlaybackController::prev,
            PlaybackController::reset,
            |p| p.seek(12),
        ];
        for op in manual {
            playback.seek(5);
            assert!(playback.play());
            op(&mut playback);
            assert!(!playback.is_playing());
            assert!(playback.tick().is_none());
        }
    }

    #[test]
    fn toggle_flips_autoplay() {
        let mut playback = controller();
        assert!(playback.toggle());
        assert!(playback.is_playing());
        assert!(!playback.toggle());
        assert!(!playback.is_playing());
    }

    #[test]
    fn boundaries_do_not_emit() {
        let mut playback = controller();
        assert!(playback.prev().is_none());
        assert!(playback.reset().is_none());
        playback.seek(23);
        assert!(playback.next().is_none());
        assert_eq!(playback.seek(100), None);

        let mut empty = PlaybackController::new(&TimeSlots::new(Vec::new()), PlaybackOptions::default());
        assert!(!empty.play());
        assert!(empty.next().is_none());
        assert!(empty.seek(3).is_none());
    }

    #[test]
    fn external_push_reconciles_without_echo() {
        let mut cursor = TimeCursor::default();
        let mut left = controller();
        let mut right = controller();

        // 两个面板互相订阅：一方的变更写入游标后广播给双方
        let mut emissions = 0;
        let mut pending = left.next().into_iter().collect::<Vec<_>>();
        while let Some(update) = pending.pop() {
            emissions += 1;
            if let Some(published) = cursor.write(update) {
                for panel in [&mut left, &mut right] {
                    panel.observe(&published);
                }
            }
        }
        assert_eq!(emissions, 1);
        assert_eq!(right.index(), 1);
        assert_eq!(cursor.index(), 1);

        let map_panel = ComponentId::new();
        let published = cursor.push_external(map_panel, "09:00").unwrap();
        assert_eq!(published.source, UpdateSource::External);
        assert!(left.observe(&published));
        assert!(right.observe(&published));
        assert!(!left.observe(&published));
        assert_eq!(left.index(), 9);
        assert_eq!(cursor.version(), 2);
    }

    #[test]
    fn own_update_is_not_reapplied() {
        let mut playback = controller();
        let update = playback.seek(4).unwrap();
        assert!(!playback.observe(&update));
        assert_eq!(playback.index(), 4);
    }

    #[test]
    fn cursor_is_last_write_wins() {
        let mut cursor = TimeCursor::default();
        let a = ComponentId::new();
        let b = ComponentId::new();
        cursor.write(TimeUpdate::internal(a, 3));
        cursor.write(TimeUpdate::internal(b, 7));
        assert_eq!(cursor.index(), 7);
        assert_eq!(cursor.label(), Some("07:00"));
        assert_eq!(cursor.last_update().map(|u| u.origin), Some(b));

        assert!(cursor.write(TimeUpdate::internal(a, 7)).is_none());
        assert_eq!(cursor.write(TimeUpdate::internal(a, 50)).map(|u| u.index), Some(23));
    }

    #[test]
    fn external_time_is_clamped_to_nearest_slot() {
        let mut cursor = TimeCursor::default();
        let map_panel = ComponentId::new();

        let published = cursor.push_external(map_panel, "25:00").unwrap();
        assert_eq!(published.index, 23);
        assert_eq!(cursor.label(), Some("23:00"));

        cursor.push_external(map_panel, "14:30");
        assert_eq!(cursor.index(), 14);
        cursor.push_external(map_panel, "14:31");
        assert_eq!(cursor.index(), 15);
        cursor.push_external(map_panel, " 6:05 ");
        assert_eq!(cursor.index(), 6);

        let version = cursor.version();
        assert!(cursor.push_external(map_panel, "noon").is_none());
        assert!(cursor.push_external(map_panel, "12:75").is_none());
        assert_eq!(cursor.index(), 6);
        assert_eq!(cursor.version(), version);
    }

    #[test]
    fn external_update_to_last_slot_ends_playback() {
        let mut playback = controller();
        assert!(playback.play());
        let other = ComponentId::new();
        playback.observe(&TimeUpdate::external(other, 23));
        assert!(!playback.is_playing());
    }
}
