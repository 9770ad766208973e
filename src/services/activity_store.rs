use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Activity, ActivityDetails, ActivityKind};

const LOG_PREFIX: &str = "activities_";
const MAX_RECENT: usize = 500;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("daily log I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("daily log {path} is not a valid activity list: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize activities: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub by_kind: BTreeMap<ActivityKind, u64>,
    pub websites: BTreeMap<String, u64>,
    pub processes: BTreeMap<String, u64>,
}

impl Counters {
    pub fn get(&self, kind: ActivityKind) -> u64 {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    fn apply(&mut self, activity: &Activity) {
        *self.by_kind.entry(activity.kind()).or_insert(0) += 1;
        match activity.details() {
            ActivityDetails::WebsiteVisit { site_name, .. } => {
                *self.websites.entry(site_name.clone()).or_insert(0) += 1;
            }
            ActivityDetails::ProcessActivity { process_name, .. } => {
                *self.processes.entry(process_name.clone()).or_insert(0) += 1;
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total: u64,
    pub by_kind: BTreeMap<ActivityKind, u64>,
}

#[derive(Default)]
struct StoreInner {
    recent: VecDeque<Activity>,
    websites: VecDeque<Activity>,
    counters: Counters,
}

/// Append-only per-day activity log plus the in-memory view the API reads.
///
/// The day file is rewritten as a whole on every append, so all writers go
/// through `writer`. The in-memory view has its own short-lived lock that is
/// never held across disk I/O; it is updated first and stays authoritative
/// when the disk write fails.
pub struct ActivityStore {
    log_dir: PathBuf,
    inner: Mutex<StoreInner>,
    writer: Mutex<()>,
}

impl ActivityStore {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            inner: Mutex::new(StoreInner::default()),
            writer: Mutex::new(()),
        }
    }

    pub fn log_path(&self, date: NaiveDate) -> PathBuf {
        self.log_dir
            .join(format!("{}{}.json", LOG_PREFIX, date.format("%Y-%m-%d")))
    }

    pub fn record(&self, activity: Activity) -> Result<(), StoreError> {
        {
            let mut inner = self.lock();
            inner.counters.apply(&activity);
            if activity.kind() == ActivityKind::WebsiteVisit {
                push_bounded(&mut inner.websites, activity.clone());
            }
            push_bounded(&mut inner.recent, activity.clone());
        }

        // One read-merge-write of a day file at a time.
        let _writer = self.lock_writer();
        self.append_to_day(&activity)
    }

    /// Most recent `limit` activities, oldest first.
    pub fn recent_activities(&self, limit: usize) -> Vec<Activity> {
        tail(&self.lock().recent, limit)
    }

    pub fn recent_website_visits(&self, limit: usize) -> Vec<Activity> {
        tail(&self.lock().websites, limit)
    }

    pub fn counters(&self) -> Counters {
        self.lock().counters.clone()
    }

    pub fn load_day(&self, date: NaiveDate) -> Result<Vec<Activity>, StoreError> {
        read_log(&self.log_path(date))
    }

    /// Per-date counts over every daily log in the directory, newest first.
    /// Unreadable files are skipped.
    pub fn daily_summaries(&self) -> Result<Vec<DailySummary>, StoreError> {
        let entries = fs::read_dir(&self.log_dir).map_err(|source| StoreError::Io {
            path: self.log_dir.clone(),
            source,
        })?;

        let mut summaries = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(date) = parse_log_date(&name) else {
                continue;
            };

            let activities = {
                let _writer = self.lock_writer();
                read_log(&entry.path())
            };
            let activities = match activities {
                Ok(list) => list,
                Err(e) => {
                    log::warn!("[Store] Skipping {}: {}", name, e);
                    continue;
                }
            };

            let mut by_kind = BTreeMap::new();
            for activity in &activities {
                *by_kind.entry(activity.kind()).or_insert(0) += 1;
            }
            summaries.push(DailySummary {
                date,
                total: activities.len() as u64,
                by_kind,
            });
        }

        summaries.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(summaries)
    }

    fn append_to_day(&self, activity: &Activity) -> Result<(), StoreError> {
        let path = self.log_path(activity.date());
        let mut entries = read_log(&path)?;
        entries.push(activity.clone());

        let body = serde_json::to_string_pretty(&entries)?;
        fs::create_dir_all(&self.log_dir).map_err(|source| StoreError::Io {
            path: self.log_dir.clone(),
            source,
        })?;

        // Write-then-rename so a crash mid-write never truncates the day.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_log(path: &Path) -> Result<Vec<Activity>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_log_date(file_name: &str) -> Option<NaiveDate> {
    let stem = file_name.strip_prefix(LOG_PREFIX)?.strip_suffix(".json")?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

fn push_bounded(list: &mut VecDeque<Activity>, activity: Activity) {
    if list.len() == MAX_RECENT {
        list.pop_front();
    }
    list.push_back(activity);
}

fn tail(list: &VecDeque<Activity>, limit: usize) -> Vec<Activity> {
    let skip = list.len().saturating_sub(limit);
    list.iter().skip(skip).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use std::sync::Arc;

    fn crm(count: u64, minute: u32) -> Activity {
        Activity::new(
            Local.with_ymd_and_hms(2025, 2, 3, 11, minute, 0).unwrap(),
            ActivityDetails::CrmAccess {
                window_title: "Bitrix24 CRM".to_string(),
                keyword: "crm".to_string(),
                count,
            },
        )
    }

    fn visit(site: &str, count: u64) -> Activity {
        Activity::new(
            Local.with_ymd_and_hms(2025, 2, 3, 12, 0, 0).unwrap(),
            ActivityDetails::WebsiteVisit {
                site_name: site.to_string(),
                window_title: format!("{site} - Mozilla Firefox"),
                visit_count: count,
            },
        )
    }

    #[test]
    fn record_appends_to_day_file_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ActivityStore::new(dir.path());

        store.record(crm(1, 0)).unwrap();
        store.record(visit("GitHub", 1)).unwrap();
        store.record(crm(2, 5)).unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
        let on_disk = store.load_day(date).unwrap();
        assert_eq!(on_disk.len(), 3);
        assert_eq!(on_disk[2], crm(2, 5));
        assert!(dir.path().join("activities_2025-02-03.json").exists());

        let counters = store.counters();
        assert_eq!(counters.get(ActivityKind::CrmAccess), 2);
        assert_eq!(counters.get(ActivityKind::WebsiteVisit), 1);
        assert_eq!(counters.websites.get("GitHub"), Some(&1));
    }

    #[test]
    fn concurrent_writers_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ActivityStore::new(dir.path()));

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        store.record(visit(&format!("site-{worker}"), i + 1)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let date = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
        let on_disk = store.load_day(date).unwrap();
        assert_eq!(on_disk.len(), 40);
        assert_eq!(store.counters().get(ActivityKind::WebsiteVisit), 40);
        for worker in 0..4 {
            let site = format!("site-{worker}");
            let stored = on_disk
                .iter()
                .filter(|a| matches!(a.details(), ActivityDetails::WebsiteVisit { site_name, .. } if *site_name == site))
                .count();
            assert_eq!(stored, 10);
        }
    }

    #[test]
    fn counters_survive_a_failed_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = ActivityStore::new(dir.path());
        fs::write(store.log_path(NaiveDate::from_ymd_opt(2025, 2, 3).unwrap()), "{ not json").unwrap();

        let err = store.record(crm(1, 0)).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert_eq!(store.counters().get(ActivityKind::CrmAccess), 1);
        assert_eq!(store.recent_activities(50).len(), 1);
    }

    #[test]
    fn recent_views_are_bounded_and_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let store = ActivityStore::new(dir.path());
        for i in 0..5 {
            store.record(crm(i + 1, i as u32)).unwrap();
        }

        let recent = store.recent_activities(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0], crm(3, 2));
        assert_eq!(recent[2], crm(5, 4));
        assert!(store.recent_website_visits(50).is_empty());
    }

    #[test]
    fn daily_summaries_group_by_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ActivityStore::new(dir.path());
        store.record(crm(1, 0)).unwrap();
        store.record(visit("Docs", 1)).unwrap();
        store
            .record(Activity::new(
                Local.with_ymd_and_hms(2025, 2, 4, 9, 0, 0).unwrap(),
                ActivityDetails::PhoneUsage { confidence: 0.81, count: 1 },
            ))
            .unwrap();
        fs::write(dir.path().join("notes.json"), "[]").unwrap();

        let summaries = store.daily_summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].date, NaiveDate::from_ymd_opt(2025, 2, 4).unwrap());
        assert_eq!(summaries[0].by_kind.get(&ActivityKind::PhoneUsage), Some(&1));
        assert_eq!(summaries[1].total, 2);
    }

    #[test]
    fn readers_do_not_wait_for_the_day_file_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ActivityStore::new(dir.path()));

        // Park the writer mid-record by holding the file lock.
        let held = store.lock_writer();
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.record(crm(1, 0)))
        };

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while store.counters().get(ActivityKind::CrmAccess) == 0 {
            assert!(std::time::Instant::now() < deadline, "counters never saw the pending record");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let started = std::time::Instant::now();
        assert_eq!(store.recent_activities(50).len(), 1);
        assert!(started.elapsed() < std::time::Duration::from_millis(50));
        assert!(store.load_day(NaiveDate::from_ymd_opt(2025, 2, 3).unwrap()).unwrap().is_empty());

        drop(held);
        writer.join().unwrap().unwrap();
        assert_eq!(store.load_day(NaiveDate::from_ymd_opt(2025, 2, 3).unwrap()).unwrap().len(), 1);
    }
}
