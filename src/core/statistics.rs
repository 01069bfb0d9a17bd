//! 对比结果统计：概览、存储量、分类分组与明细表

use crate::core::comparator::{ClassifiedEvents, ComparedEvent, EventStatus};
use crate::drive::{Event, EventType};
use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const UNKNOWN: &str = "Unknown";

/// 数量 + 字节数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSize {
    pub count: usize,
    pub size: u64,
}

impl CountSize {
    fn add(&mut self, size: u64) {
        self.count += 1;
        self.size += size;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
    pub source: CountSize,
    pub dest: CountSize,
    pub missing: CountSize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub source_events: usize,
    pub dest_events: usize,
    pub missing: usize,
    pub newer: usize,
    pub different_size: usize,
    pub same: usize,
    pub dest_only: usize,
    /// round(same / source_events * 100)，源端为空时为 0
    pub sync_percent: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageTotals {
    pub source_total: u64,
    pub dest_total: u64,
    pub to_transfer: u64,
}

/// 明细表的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    pub name: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub location: String,
    /// `YYYY-MM-DDTHH:MM:SS`，无法确定时为空
    pub date: Option<String>,
    pub size: u64,
    pub status: EventStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailColumn {
    Name,
    Type,
    Location,
    Date,
    Size,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailTable {
    pub rows: Vec<DetailRow>,
}

impl DetailTable {
    /// 按列排序；字符串列忽略大小写，数值列按数值
    pub fn sort(&mut self, column: DetailColumn, direction: SortDirection) {
        self.rows.sort_by(|a, b| {
            let ord = match column {
                DetailColumn::Name => cmp_text(&a.name, &b.name),
                DetailColumn::Type => cmp_text(a.event_type.folder_name(), b.event_type.folder_name()),
                DetailColumn::Location => cmp_text(&a.location, &b.location),
                DetailColumn::Date => cmp_text(
                    a.date.as_deref().unwrap_or(""),
                    b.date.as_deref().unwrap_or(""),
                ),
                DetailColumn::Size => a.size.cmp(&b.size),
                DetailColumn::Status => cmp_text(a.status.as_str(), b.status.as_str()),
            };
            match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
    }

    pub fn filter(&self, status: EventStatus) -> Vec<&DetailRow> {
        self.rows.iter().filter(|r| r.status == status).collect()
    }
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub overview: Overview,
    pub storage: StorageTotals,
    pub by_type: BTreeMap<EventType, Breakdown>,
    pub by_month: BTreeMap<String, Breakdown>,
    pub by_location: BTreeMap<String, Breakdown>,
    pub details: DetailTable,
}

fn folder_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4})-(\d{2})-(\d{2})_(\d{2})-(\d{2})-(\d{2})")
            .unwrap_or_else(|e| unreachable!("invalid folder date pattern: {}", e))
    })
}

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 元数据时间戳：本地时间（可带小数秒）或 RFC 3339
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

/// 事件日期：优先元数据时间戳，其次文件夹名称
pub fn event_date(event: &Event) -> Option<String> {
    let from_meta = event
        .metadata
        .as_ref()
        .and_then(|m| m.timestamp.as_deref())
        .and_then(parse_timestamp);
    if let Some(ts) = from_meta {
        return Some(ts.format(DATE_FORMAT).to_string());
    }

    let caps = folder_date_regex().captures(&event.name)?;
    Some(format!(
        "{}-{}-{}T{}:{}:{}",
        &caps[1], &caps[2], &caps[3], &caps[4], &caps[5], &caps[6]
    ))
}

/// `YYYY-MM`，无法确定时为 `Unknown`
pub fn event_month(event: &Event) -> String {
    event_date(event)
        .and_then(|d| d.get(..7).map(str::to_string))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn event_location(event: &Event) -> String {
    event.city().unwrap_or(UNKNOWN).to_string()
}

fn dest_size(entry: &ComparedEvent) -> u64 {
    entry
        .dest_fingerprint
        .as_ref()
        .unwrap_or(&entry.fingerprint)
        .total_size
}

pub struct StatisticsAggregator;

impl StatisticsAggregator {
    /// 纯计算，不做任何 I/O
    pub fn aggregate(classified: &ClassifiedEvents) -> Statistics {
        let mut stats = Statistics::default();

        let overview = &mut stats.overview;
        overview.missing = classified.missing.len();
        overview.newer = classified.newer.len();
        overview.different_size = classified.different_size.len();
        overview.same = classified.same.len();
        overview.dest_only = classified.dest_only.len();
        overview.source_events =
            overview.missing + overview.newer + overview.different_size + overview.same;
        overview.dest_events =
            overview.newer + overview.different_size + overview.same + overview.dest_only;
        overview.sync_percent = if overview.source_events == 0 {
            0
        } else {
            (overview.same as f64 / overview.source_events as f64 * 100.0).round() as u32
        };

        for (status, entry) in classified.iter() {
            let source_size = entry.fingerprint.total_size;
            let on_source = status != EventStatus::DestOnly;
            let on_dest = status != EventStatus::Missing;
            // 目标端存储量只统计 same / differentSize / destOnly
            let counts_for_dest = matches!(
                status,
                EventStatus::Same | EventStatus::DifferentSize | EventStatus::DestOnly
            );

            if on_source {
                stats.storage.source_total += source_size;
            }
            if counts_for_dest {
                stats.storage.dest_total += dest_size(entry);
            }
            if matches!(status, EventStatus::Missing | EventStatus::Newer) {
                stats.storage.to_transfer += source_size;
            }

            let keys = [
                Group::Type(entry.event.event_type),
                Group::Month(event_month(&entry.event)),
                Group::Location(event_location(&entry.event)),
            ];
            for key in keys {
                let bucket = match key {
                    Group::Type(t) => stats.by_type.entry(t).or_default(),
                    Group::Month(m) => stats.by_month.entry(m).or_default(),
                    Group::Location(l) => stats.by_location.entry(l).or_default(),
                };
                if on_source {
                    bucket.source.add(source_size);
                }
                if on_dest {
                    bucket.dest.add(dest_size(entry));
                }
                if status == EventStatus::Missing {
                    bucket.missing.add(source_size);
                }
            }

            stats.details.rows.push(DetailRow {
                name: entry.event.name.clone(),
                event_type: entry.event.event_type,
                location: event_location(&entry.event),
                date: event_date(&entry.event),
                size: entry.fingerprint.total_size,
                status,
            });
        }

        stats
    }
}

enum Group {
    Type(EventType),
    Month(String),
    Location(String),
}
