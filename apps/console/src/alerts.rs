use std::collections::VecDeque;

use tracing::debug;

use crate::models::{AlertPatch, AlertRecord};

pub const DEFAULT_ALERT_CAPACITY: usize = 100;

/// 告警集合：最新在前、按 id 去重、容量有界。
///
/// 未读数只统计 `read == false && level != info` 的记录，每次变更都同步维护，
/// 批量载入时一次性重算。外部只能拿到只读快照。
#[derive(Clone, Debug)]
pub struct AlertStore {
    records: VecDeque<AlertRecord>,
    capacity: usize,
    unread: usize,
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ALERT_CAPACITY)
    }
}

impl AlertStore {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            unread: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn get(&self, id: &str) -> Option<&AlertRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlertRecord> {
        self.records.iter()
    }

    pub fn snapshot(&self) -> Vec<AlertRecord> {
        self.records.iter().cloned().collect()
    }

    /// 新告警插到最前。同 id 的旧记录先被移除（重复推送视为再次发生），
    /// 超出容量时静默丢弃最旧的记录。返回新的集合大小。
    pub fn append(&mut self, record: AlertRecord) -> usize {
        if let Some(position) = self.position(&record.id) {
            if let Some(previous) = self.records.remove(position) {
                self.forget(&previous);
            }
        }

        if record.is_unread() {
            self.unread += 1;
        }
        self.records.push_front(record);

        while self.records.len() > self.capacity {
            if let Some(dropped) = self.records.pop_back() {
                debug!(id = %dropped.id, "alert store at capacity, dropping oldest");
                self.forget(&dropped);
            }
        }

        self.records.len()
    }

    /// 原位合并；id 不存在时不做任何事（乱序到达的更新不能凭空造出记录）。
    pub fn update(&mut self, id: &str, patch: &AlertPatch) -> bool {
        let Some(record) = self.records.iter_mut().find(|record| record.id == id) else {
            return false;
        };

        let was_unread = record.is_unread();
        record.apply_patch(patch);
        let is_unread = record.is_unread();

        match (was_unread, is_unread) {
            (true, false) => self.unread = self.unread.saturating_sub(1),
            (false, true) => self.unread += 1,
            _ => {}
        }
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let Some(position) = self.position(id) else {
            return false;
        };
        match self.records.remove(position) {
            Some(removed) => {
                self.forget(&removed);
                true
            }
            None => false,
        }
    }

    /// 返回被清除的条数。
    pub fn clear_all(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        self.unread = 0;
        removed
    }

    /// 只有真正从未读变为已读时才返回 true；重复调用不会再动计数。
    pub fn mark_read(&mut self, id: &str) -> bool {
        let Some(record) = self.records.iter_mut().find(|record| record.id == id) else {
            return false;
        };
        if record.read {
            return false;
        }

        let was_unread = record.is_unread();
        record.read = true;
        if was_unread {
            self.unread = self.unread.saturating_sub(1);
        }
        true
    }

    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for record in self.records.iter_mut().filter(|record| !record.read) {
            record.read = true;
            changed += 1;
        }
        self.unread = 0;
        changed
    }

    /// 启动时的历史告警整体替换。输入视为最新在前；重复 id 保留第一次出现的那条。
    pub fn load_history(&mut self, records: Vec<AlertRecord>) -> usize {
        let mut next: VecDeque<AlertRecord> = VecDeque::with_capacity(self.capacity);
        for record in records {
            if next.len() == self.capacity {
                break;
            }
            if next.iter().any(|existing| existing.id == record.id) {
                continue;
            }
            next.push_back(record);
        }

        let unread = next.iter().filter(|record| record.is_unread()).count();
        self.records = next;
        self.unread = unread;
        self.records.len()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|record| record.id == id)
    }

    fn forget(&mut self, record: &AlertRecord) {
        if record.is_unread() {
            self.unread = self.unread.saturating_sub(1);
        }
    }
}
