use chrono::{Local, NaiveDate};
use tracing::{info, warn};

use crate::download::DownloadService;
use crate::github::fetch_latest_release;
use crate::reshade_downloader::latest_online_version;
use crate::settings::SettingsStore;

pub const CHECK_INTERVAL_DAYS: i64 = 7;

/// Online lookups happen at most once per interval.
pub fn is_check_due(last_check: Option<NaiveDate>, today: NaiveDate) -> bool {
    match last_check {
        Some(last) => (today - last).num_days() >= CHECK_INTERVAL_DAYS,
        None => true,
    }
}

/// Newest ReShade version on the website, cached in settings between checks. Network
/// failures fall back to the cached value.
pub async fn latest_reshade_version(settings: &SettingsStore, service: &DownloadService) -> Option<String> {
    let today = Local::now().date_naive();
    let cached = Some(settings.latest_reshade_version()).filter(|v| !v.is_empty());
    if !is_check_due(settings.latest_reshade_check_date(), today) {
        return cached;
    }
    match latest_online_version(service).await {
        Ok(Some(version)) => {
            settings.set_latest_reshade_version(&version);
            settings.set_latest_reshade_check_date(today);
            Some(version)
        }
        Ok(None) => cached,
        Err(e) => {
            warn!("ReShade version check failed: {}", e.details());
            cached
        }
    }
}

/// Record a finished ReShade download so the next startup does not ask again.
pub fn record_reshade_install(settings: &SettingsStore, version: &str) {
    settings.set_latest_reshade_version(version);
    settings.set_latest_reshade_check_date(Local::now().date_naive());
}

/// Decide whether a freshly fetched release should be offered: only when it differs from
/// both the last seen release and the running build.
pub fn should_offer_update(previous: &str, fetched: &str, current_version: &str) -> bool {
    !fetched.is_empty() && fetched != previous && fetched != current_version
}

/// Returns the version of a new deployer release worth offering to the user, if any.
pub async fn check_deployer_update(
    settings: &SettingsStore,
    service: &DownloadService,
    current_version: &str,
) -> Option<String> {
    let today = Local::now().date_naive();
    if !is_check_due(settings.latest_deployer_check_date(), today) {
        return None;
    }
    let release = match fetch_latest_release(service).await {
        Ok(release) => release,
        Err(e) => {
            warn!("Deployer update check failed: {}", e.details());
            return None;
        }
    };
    settings.set_latest_deployer_check_date(today);
    let fetched = release.version()?;
    let previous = settings.latest_deployer_version();
    settings.set_latest_deployer_version(&fetched);
    if should_offer_update(&previous, &fetched, current_version) {
        info!("Deployer {fetched} is available (running {current_version})");
        Some(fetched)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekly_check_schedule() {
        assert!(is_check_due(None, day(2024, 5, 1)));
        assert!(!is_check_due(Some(day(2024, 5, 1)), day(2024, 5, 7)));
        assert!(is_check_due(Some(day(2024, 5, 1)), day(2024, 5, 8)));
        assert!(is_check_due(Some(day(2023, 12, 30)), day(2024, 1, 10)));
    }

    #[test]
    fn update_is_offered_once_per_new_release() {
        assert!(should_offer_update("", "1.4.0", "1.3.0"));
        assert!(!should_offer_update("1.4.0", "1.4.0", "1.3.0"));
        assert!(!should_offer_update("1.3.0", "1.4.0", "1.4.0"));
        assert!(!should_offer_update("1.3.0", "", "1.2.0"));
    }
}
