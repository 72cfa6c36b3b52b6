use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::ini::IniDocument;

const SAVE_DELAY: Duration = Duration::from_millis(100);
const DATE_FORMAT: &str = "%Y-%m-%d";

const LATEST_RESHADE_VERSION: &str = "LatestReShadeVersionNumber";
const LATEST_RESHADE_CHECK_DATE: &str = "LatestReShadeVersionNumberCheckDate";
const LATEST_DEPLOYER_VERSION: &str = "LatestDeployerVersionNumber";
const LATEST_DEPLOYER_CHECK_DATE: &str = "LatestDeployerVersionNumberCheckDate";
const ALWAYS_EXIT_ON_DEPLOY: &str = "AlwaysExitOnDeploy";

struct Inner {
    path: PathBuf,
    doc: Mutex<IniDocument>,
    awaiting_save: AtomicBool,
}

/// Application settings backed by `lib/Config.ini`. Reads never fail; writes are coalesced
/// into a single save shortly after the last change.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<Inner>,
}

impl SettingsStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let doc = if path.is_file() {
            IniDocument::load(&path).unwrap_or_else(|e| {
                warn!("Ignoring unreadable settings {}: {e}", path.display());
                IniDocument::new()
            })
        } else {
            IniDocument::new()
        };
        Self { inner: Arc::new(Inner { path, doc: Mutex::new(doc), awaiting_save: AtomicBool::new(false) }) }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn get(&self, key: &str) -> Option<String> {
        let doc = self.inner.doc.lock().ok()?;
        doc.global(key).map(str::to_string)
    }

    fn set(&self, key: &str, value: String) {
        {
            let Ok(mut doc) = self.inner.doc.lock() else { return };
            if doc.global(key) == Some(value.as_str()) {
                return;
            }
            doc.set_global(key, value);
        }
        self.schedule_save();
    }

    fn get_date(&self, key: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.get(key)?, DATE_FORMAT).ok()
    }

    fn set_date(&self, key: &str, date: NaiveDate) {
        self.set(key, date.format(DATE_FORMAT).to_string());
    }

    pub fn latest_reshade_version(&self) -> String {
        self.get(LATEST_RESHADE_VERSION).unwrap_or_default()
    }

    pub fn set_latest_reshade_version(&self, version: &str) {
        self.set(LATEST_RESHADE_VERSION, version.to_string());
    }

    pub fn latest_reshade_check_date(&self) -> Option<NaiveDate> {
        self.get_date(LATEST_RESHADE_CHECK_DATE)
    }

    pub fn set_latest_reshade_check_date(&self, date: NaiveDate) {
        self.set_date(LATEST_RESHADE_CHECK_DATE, date);
    }

    pub fn latest_deployer_version(&self) -> String {
        self.get(LATEST_DEPLOYER_VERSION).unwrap_or_default()
    }

    pub fn set_latest_deployer_version(&self, version: &str) {
        self.set(LATEST_DEPLOYER_VERSION, version.to_string());
    }

    pub fn latest_deployer_check_date(&self) -> Option<NaiveDate> {
        self.get_date(LATEST_DEPLOYER_CHECK_DATE)
    }

    pub fn set_latest_deployer_check_date(&self, date: NaiveDate) {
        self.set_date(LATEST_DEPLOYER_CHECK_DATE, date);
    }

    pub fn always_exit_on_deploy(&self) -> bool {
        self.get(ALWAYS_EXIT_ON_DEPLOY)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn set_always_exit_on_deploy(&self, enabled: bool) {
        self.set(ALWAYS_EXIT_ON_DEPLOY, if enabled { "True" } else { "False" }.to_string());
    }

    fn schedule_save(&self) {
        if self.inner.awaiting_save.swap(true, Ordering::SeqCst) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.clone();
                handle.spawn(async move {
                    tokio::time::sleep(SAVE_DELAY).await;
                    if let Err(e) = store.save_now() {
                        warn!("{e:#}");
                    }
                });
            }
            Err(_) => {
                if let Err(e) = self.save_now() {
                    warn!("{e:#}");
                }
            }
        }
    }

    fn save_now(&self) -> Result<()> {
        self.inner.awaiting_save.store(false, Ordering::SeqCst);
        let doc = self
            .inner
            .doc
            .lock()
            .map_err(|_| anyhow::anyhow!("settings lock poisoned"))?
            .clone();
        doc.save(&self.inner.path, " ")
            .with_context(|| format!("failed to save settings to {}", self.inner.path.display()))?;
        debug!("settings saved to {}", self.inner.path.display());
        Ok(())
    }

    /// Write pending changes now instead of waiting for the deferred save.
    pub fn flush(&self) -> Result<()> {
        self.save_now()
    }
}
