//! Audit journal types: event records and the journal query filter.

use crate::{Initiator, MappingId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Result count used when a filter is built without a positive limit.
pub const DEFAULT_EVENTS_COUNT: u32 = 100;

/// Lower bound of every audit date range when no start date is given.
pub const MINIMAL_START_DATE: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// Kind of mapping mutation recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditEventKind {
    Create,
    Update,
    Delete,
}

impl AuditEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEventKind::Create => "create",
            AuditEventKind::Update => "update",
            AuditEventKind::Delete => "delete",
        }
    }
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown audit event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for AuditEventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(AuditEventKind::Create),
            "update" => Ok(AuditEventKind::Update),
            "delete" => Ok(AuditEventKind::Delete),
            _ => Err(UnknownEventKind(s.to_string())),
        }
    }
}

/// Identifier assigned to an audit record by the audit storage on persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditRecordId(pub i64);

impl fmt::Display for AuditRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One append-only journal entry.
///
/// `mapping_id` is a soft reference: the mapping may be gone while the record stays.
/// `id` is `None` until the record has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEventRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AuditRecordId>,
    pub initiator: Initiator,
    /// Capture time of the event, not the time it was persisted.
    pub timestamp: DateTime<Utc>,
    pub event: AuditEventKind,
    pub mapping_id: MappingId,
    #[serde(default)]
    pub additional_info: BTreeMap<String, String>,
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start && *ts < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("start date of interval can't be after end date ({start} > {end})")]
    InvertedRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("date range cannot be widened past {end}")]
    RangeOverflow { end: DateTime<Utc> },
}

/// `ts` plus one day, or `None` past the last representable instant.
fn one_day_after(ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
    ts.checked_add_signed(Duration::days(1))
}

/// Query over the audit journal. Empty id/initiator sets mean "unfiltered".
///
/// Construct through [`AuditJournalFilterBuilder`], which enforces the defaults and
/// the non-empty date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditJournalFilter {
    max_results: u32,
    mapping_ids: BTreeSet<MappingId>,
    initiators: BTreeSet<Initiator>,
    date_range: DateRange,
    event_kind: Option<AuditEventKind>,
}

impl AuditJournalFilter {
    pub fn builder() -> AuditJournalFilterBuilder {
        AuditJournalFilterBuilder::default()
    }

    pub fn max_results(&self) -> u32 {
        self.max_results
    }

    pub fn mapping_ids(&self) -> &BTreeSet<MappingId> {
        &self.mapping_ids
    }

    pub fn initiators(&self) -> &BTreeSet<Initiator> {
        &self.initiators
    }

    pub fn date_range(&self) -> DateRange {
        self.date_range
    }

    pub fn event_kind(&self) -> Option<AuditEventKind> {
        self.event_kind
    }

    /// Record predicate shared by every storage backend (the limit is applied separately).
    pub fn matches(&self, record: &AuditEventRecord) -> bool {
        if !self.mapping_ids.is_empty() && !self.mapping_ids.contains(&record.mapping_id) {
            return false;
        }
        if !self.initiators.is_empty() && !self.initiators.contains(&record.initiator) {
            return false;
        }
        if let Some(kind) = self.event_kind {
            if record.event != kind {
                return false;
            }
        }
        self.date_range.contains(&record.timestamp)
    }

    /// Sorts newest-first, drops non-matching records and truncates to `max_results`.
    pub fn apply(&self, records: impl IntoIterator<Item = AuditEventRecord>) -> Vec<AuditEventRecord> {
        let mut out: Vec<AuditEventRecord> =
            records.into_iter().filter(|r| self.matches(r)).collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        out.truncate(self.max_results as usize);
        out
    }
}

impl Default for AuditJournalFilter {
    fn default() -> Self {
        AuditJournalFilterBuilder::without_filtering()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditJournalFilterBuilder {
    events_limit: Option<i64>,
    mapping_ids: BTreeSet<MappingId>,
    initiators: BTreeSet<Initiator>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    event_kind: Option<AuditEventKind>,
}

impl AuditJournalFilterBuilder {
    /// Non-positive limits fall back to [`DEFAULT_EVENTS_COUNT`].
    pub fn with_events_limit(mut self, limit: i64) -> Self {
        self.events_limit = Some(limit);
        self
    }

    /// Id 0 is treated as "not given".
    pub fn for_id(mut self, id: MappingId) -> Self {
        if id.get() != 0 {
            self.mapping_ids.insert(id);
        }
        self
    }

    pub fn for_ids(self, ids: impl IntoIterator<Item = MappingId>) -> Self {
        ids.into_iter().fold(self, Self::for_id)
    }

    /// Blank initiators are ignored.
    pub fn by_initiator(mut self, initiator: impl Into<Initiator>) -> Self {
        let initiator = initiator.into();
        if !initiator.as_str().trim().is_empty() {
            self.initiators.insert(initiator);
        }
        self
    }

    pub fn by_initiators(self, initiators: impl IntoIterator<Item = Initiator>) -> Self {
        initiators.into_iter().fold(self, Self::by_initiator)
    }

    pub fn start_from_date(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn before_date(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn by_event(mut self, kind: AuditEventKind) -> Self {
        self.event_kind = Some(kind);
        self
    }

    pub fn build(self) -> Result<AuditJournalFilter, FilterError> {
        self.build_at(Utc::now())
    }

    /// Like [`build`](Self::build) with an explicit "now" for the default end date.
    pub fn build_at(self, now: DateTime<Utc>) -> Result<AuditJournalFilter, FilterError> {
        let max_results = match self.events_limit {
            Some(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
            _ => DEFAULT_EVENTS_COUNT,
        };
        let start = self.start.unwrap_or(MINIMAL_START_DATE);
        let mut end = match self.end {
            Some(end) => end,
            None => one_day_after(now).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        if start > end {
            return Err(FilterError::InvertedRange { start, end });
        }
        if start == end {
            end = one_day_after(end).ok_or(FilterError::RangeOverflow { end })?;
        }
        Ok(AuditJournalFilter {
            max_results,
            mapping_ids: self.mapping_ids,
            initiators: self.initiators,
            date_range: DateRange { start, end },
            event_kind: self.event_kind,
        })
    }

    pub fn without_filtering() -> AuditJournalFilter {
        AuditJournalFilter {
            max_results: DEFAULT_EVENTS_COUNT,
            mapping_ids: BTreeSet::new(),
            initiators: BTreeSet::new(),
            date_range: DateRange {
                start: MINIMAL_START_DATE,
                end: one_day_after(Utc::now()).unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
            event_kind: None,
        }
    }
}
