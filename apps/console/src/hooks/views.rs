use std::rc::Rc;

use dioxus::prelude::*;
use tracing::debug;

use netpulse_console::fixtures::FixtureSource;
use netpulse_console::models::ViewKey;
use netpulse_console::views::{ViewDataSource, ViewFetchOutcome, ViewOrchestrator};

use super::{use_app_actions, AppActions};
use crate::{API_CLIENT, APP_CONFIG};

#[cfg(target_arch = "wasm32")]
const ACTIVE_VIEW_STORAGE_KEY: &str = "netpulse.active_view";

pub type DataSource = Box<dyn ViewDataSource>;

#[derive(Clone)]
pub struct ViewsHandle {
    orchestrator: Rc<ViewOrchestrator<DataSource>>,
    actions: AppActions,
}

impl PartialEq for ViewsHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.orchestrator, &other.orchestrator)
    }
}

impl ViewsHandle {
    fn new(actions: AppActions) -> Self {
        let options = APP_CONFIG
            .get()
            .map(|config| config.orchestrator_options())
            .unwrap_or_default();
        let source: DataSource = match API_CLIENT.get().cloned() {
            Some(client) => Box::new(client),
            None => {
                debug!("api client missing, serving fixture view data");
                Box::new(FixtureSource)
            }
        };
        let orchestrator = Rc::new(ViewOrchestrator::new(source, options));
        if let Some(key) = persisted_view() {
            orchestrator.activate(key);
        }
        Self {
            orchestrator,
            actions,
        }
    }

    pub fn active_view(&self) -> ViewKey {
        self.orchestrator.active_view()
    }

    pub fn activate(&self, key: ViewKey) {
        self.orchestrator.activate(key);
        persist_view(key);
        self.actions.sync_views(&self.orchestrator);
    }

    pub fn fetch(&self, key: ViewKey) {
        self.launch(key, None);
    }

    pub fn fetch_at(&self, key: ViewKey, slot_label: String) {
        self.launch(key, Some(slot_label));
    }

    pub fn refresh(&self) {
        self.launch(self.active_view(), None);
    }

    fn launch(&self, key: ViewKey, scope: Option<String>) {
        let orchestrator = Rc::clone(&self.orchestrator);
        let actions = self.actions;
        spawn(async move {
            let fetch = async {
                match scope.as_deref() {
                    Some(label) => orchestrator.fetch_view_at(key, label).await,
                    None => orchestrator.fetch_view(key).await,
                }
            };
            // 先轮询 fetch，loading 标记落地后立即同步一次
            let (outcome, _) = futures::join!(fetch, async { actions.sync_views(&orchestrator) });
            actions.sync_views(&orchestrator);
            if outcome == ViewFetchOutcome::Superseded {
                debug!(view = %key, "view result superseded by a newer fetch");
            }
        });
    }
}

pub fn use_views_provider() -> ViewsHandle {
    let actions = use_app_actions();
    let handle = use_hook(|| ViewsHandle::new(actions));
    use_context_provider(|| handle.clone());
    handle
}

pub fn use_views() -> ViewsHandle {
    use_context::<ViewsHandle>()
}

/// 进入视图时激活并拉取一次。
pub fn use_view_data(key: ViewKey) -> ViewsHandle {
    let views = use_views();
    let handle = views.clone();
    use_effect(use_reactive!(|key| {
        handle.activate(key);
        handle.fetch(key);
    }));
    views
}

#[cfg(target_arch = "wasm32")]
fn persisted_view() -> Option<ViewKey> {
    use gloo_storage::{LocalStorage, Storage};

    LocalStorage::get::<String>(ACTIVE_VIEW_STORAGE_KEY)
        .ok()
        .and_then(|raw| ViewKey::parse(&raw))
}

#[cfg(not(target_arch = "wasm32"))]
fn persisted_view() -> Option<ViewKey> {
    None
}

#[cfg(target_arch = "wasm32")]
fn persist_view(key: ViewKey) {
    use gloo_storage::{LocalStorage, Storage};

    if let Err(err) = LocalStorage::set(ACTIVE_VIEW_STORAGE_KEY, key.as_str()) {
        tracing::warn!(%err, "failed to persist active view");
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn persist_view(_key: ViewKey) {}
