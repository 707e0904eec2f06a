// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! Job timestamps
//!
//! Persisted as a flat map of epoch milliseconds:
//! `{createDate, startDate?, endDate?}`.

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::errors::{ToolflowError, ToolflowResult};

const CREATE_DATE: &str = "createDate";
const START_DATE: &str = "startDate";
const END_DATE: &str = "endDate";

/// Flat key-value form used for persistence
pub type StatsMap = BTreeMap<String, Value>;

/// Creation, start and end timestamps of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "StatsMap", try_from = "StatsMap")]
pub struct JobStats {
    create_date: DateTime<Utc>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
}

impl JobStats {
    /// Stats for a job created now
    pub fn new() -> Self {
        Self::created_at(now())
    }

    /// Stats for a job created at the given instant
    pub fn created_at(create_date: DateTime<Utc>) -> Self {
        Self {
            create_date,
            start_date: None,
            end_date: None,
        }
    }

    pub fn create_date(&self) -> DateTime<Utc> {
        self.create_date
    }

    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }

    /// Stamp the start date. Returns false if it was already set.
    pub fn mark_started(&mut self, at: DateTime<Utc>) -> bool {
        if self.start_date.is_some() {
            return false;
        }
        self.start_date = Some(at);
        true
    }

    /// Stamp the end date. Returns false if it was already set.
    pub fn mark_ended(&mut self, at: DateTime<Utc>) -> bool {
        if self.end_date.is_some() {
            return false;
        }
        self.end_date = Some(at);
        true
    }

    /// Serialize to the flat persistence map
    ///
    /// Absent optional dates are left out of the map, never written as zero.
    pub fn to_map(&self) -> StatsMap {
        let mut map = StatsMap::new();
        map.insert(CREATE_DATE.into(), self.create_date.timestamp_millis().into());
        if let Some(start) = self.start_date {
            map.insert(START_DATE.into(), start.timestamp_millis().into());
        }
        if let Some(end) = self.end_date {
            map.insert(END_DATE.into(), end.timestamp_millis().into());
        }
        map
    }

    /// Deserialize from the flat persistence map
    ///
    /// `createDate` must be present; every present date must be numeric.
    pub fn from_map(map: &StatsMap) -> ToolflowResult<Self> {
        let create_date = match map.get(CREATE_DATE) {
            Some(value) => millis_to_date(CREATE_DATE, value)?,
            None => {
                return Err(ToolflowError::configuration(format!(
                    "job stats are missing '{CREATE_DATE}'"
                )))
            }
        };
        let start_date = map
            .get(START_DATE)
            .map(|v| millis_to_date(START_DATE, v))
            .transpose()?;
        let end_date = map
            .get(END_DATE)
            .map(|v| millis_to_date(END_DATE, v))
            .transpose()?;

        Ok(Self {
            create_date,
            start_date,
            end_date,
        })
    }
}

impl Default for JobStats {
    fn default() -> Self {
        Self::new()
    }
}

impl From<JobStats> for StatsMap {
    fn from(stats: JobStats) -> Self {
        stats.to_map()
    }
}

impl TryFrom<StatsMap> for JobStats {
    type Error = ToolflowError;

    fn try_from(map: StatsMap) -> Result<Self, Self::Error> {
        Self::from_map(&map)
    }
}

/// Current time at the millisecond precision the persisted form keeps
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn millis_to_date(key: &str, value: &Value) -> ToolflowResult<DateTime<Utc>> {
    let millis = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| ToolflowError::configuration(format!("'{key}' is out of range: {n}")))?,
        other => {
            return Err(ToolflowError::configuration(format!(
                "'{key}' must be numeric epoch milliseconds, got {other}"
            )))
        }
    };

    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| ToolflowError::configuration(format!("'{key}' is not a valid timestamp: {millis}")))
}
