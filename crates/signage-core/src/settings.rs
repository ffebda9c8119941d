//! CMS-driven display settings (spec.md §6, the `register` option table).
//!
//! These are returned by the transport's `register` call and may override
//! locally-configured defaults at runtime; see `signage-player`'s settings
//! precedence (SPEC_FULL.md §6: CLI > config file > CMS > built-in default).

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

fn default_collect_interval() -> u32 {
    300
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Audit,
    Info,
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum AggregationLevel {
    Individual,
    Aggregate,
}

/// A `HH:MM` wall-clock window, possibly wrapping past midnight
/// (spec.md §6, `downloadStartWindow`/`downloadEndWindow`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start <= self.end {
            now >= self.start && now < self.end
        } else {
            now >= self.start || now < self.end
        }
    }
}

/// Options recognised in a `register` response (spec.md §6 table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySettings {
    #[serde(default = "default_collect_interval")]
    pub collect_interval: u32,
    pub display_name: Option<String>,
    pub size_x: Option<u32>,
    pub size_y: Option<u32>,
    #[serde(default)]
    pub stats_enabled: bool,
    #[serde(default = "default_aggregation")]
    pub aggregation_level: AggregationLevel,
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    pub xmr_network_address: Option<String>,
    pub xmr_web_socket_address: Option<String>,
    pub xmr_cms_key: Option<String>,
    #[serde(default)]
    pub prevent_sleep: bool,
    #[serde(default = "default_screenshot_interval")]
    pub screenshot_interval: u32,
    pub download_start_window: Option<String>,
    pub download_end_window: Option<String>,
    #[serde(default)]
    pub is_ssp_enabled: bool,
    pub licence_code: Option<String>,
}

fn default_aggregation() -> AggregationLevel {
    AggregationLevel::Individual
}

fn default_screenshot_interval() -> u32 {
    3600
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            collect_interval: default_collect_interval(),
            display_name: None,
            size_x: None,
            size_y: None,
            stats_enabled: false,
            aggregation_level: default_aggregation(),
            log_level: default_log_level(),
            xmr_network_address: None,
            xmr_web_socket_address: None,
            xmr_cms_key: None,
            prevent_sleep: false,
            screenshot_interval: default_screenshot_interval(),
            download_start_window: None,
            download_end_window: None,
            is_ssp_enabled: false,
            licence_code: None,
        }
    }
}

impl DisplaySettings {
    /// `collectInterval` clamped to the spec's 60..86400 second range.
    pub fn clamped_collect_interval(&self) -> u32 {
        self.collect_interval.clamp(60, 86_400)
    }

    /// Parsed download window, if both bounds were supplied and parse.
    pub fn download_window(&self) -> Option<TimeWindow> {
        let start = self.download_start_window.as_deref()?;
        let end = self.download_end_window.as_deref()?;
        let start = NaiveTime::parse_from_str(start, "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(end, "%H:%M").ok()?;
        Some(TimeWindow { start, end })
    }
}

/// Policy for handling a declared-vs-actual MD5 mismatch (spec.md §9, Open
/// Question #1: the teacher's source was inconsistent here, so this core
/// exposes it as an explicit, required field rather than inferring it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrityPolicy {
    /// Mismatch fails the download task.
    Enforce,
    /// Mismatch is logged and a fault is recorded, but the entry is still
    /// committed to the store ("kiosk mode", spec.md §4.3 / §8 scenario 6).
    WarnOnly,
}

impl Default for IntegrityPolicy {
    fn default() -> Self {
        Self::Enforce
    }
}
