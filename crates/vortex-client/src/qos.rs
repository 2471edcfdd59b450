// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! QoS policies attached to topics, readers and writers at creation time.
//!
//! Each policy travels as an object tagged by an integer `id`:
//! History=0, Reliability=1, Partition=2, TimeFilter=4, Durability=5.
//!
//! ```
//! use vortex_client::QosPolicy;
//!
//! let wire = serde_json::to_string(&vec![QosPolicy::reliable(), QosPolicy::keep_last(4)]).unwrap();
//! assert_eq!(wire, r#"[{"id":1,"k":0},{"id":0,"k":1,"v":4}]"#);
//! ```

use serde::{Deserialize, Serialize};

const HISTORY_ID: u8 = 0;
const RELIABILITY_ID: u8 = 1;
const PARTITION_ID: u8 = 2;
const TIME_FILTER_ID: u8 = 4;
const DURABILITY_ID: u8 = 5;

/// History QoS policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    /// Keep every sample.
    KeepAll,
    /// Keep the last `depth` samples per instance.
    KeepLast(u32),
}

impl HistoryKind {
    fn code(self) -> u8 {
        match self {
            Self::KeepAll => 0,
            Self::KeepLast(_) => 1,
        }
    }
}

/// Reliability QoS policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReliabilityKind {
    /// Retransmit on loss.
    Reliable,
    /// No retransmissions.
    #[default]
    BestEffort,
}

impl ReliabilityKind {
    fn code(self) -> u8 {
        match self {
            Self::Reliable => 0,
            Self::BestEffort => 1,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Reliable),
            1 => Some(Self::BestEffort),
            _ => None,
        }
    }
}

/// Durability QoS policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityKind {
    /// Only live data.
    #[default]
    Volatile,
    /// Writer keeps samples for late joiners.
    TransientLocal,
    /// Service keeps samples while the system runs.
    Transient,
    /// Samples survive restarts.
    Persistent,
}

impl DurabilityKind {
    fn code(self) -> u8 {
        match self {
            Self::Volatile => 0,
            Self::TransientLocal => 1,
            Self::Transient => 2,
            Self::Persistent => 3,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Volatile),
            1 => Some(Self::TransientLocal),
            2 => Some(Self::Transient),
            3 => Some(Self::Persistent),
            _ => None,
        }
    }
}

/// A single QoS policy value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy", into = "RawPolicy")]
pub enum QosPolicy {
    History(HistoryKind),
    Reliability(ReliabilityKind),
    Partition(Vec<String>),
    /// Minimum separation between samples delivered to a reader.
    TimeFilter(u32),
    Durability(DurabilityKind),
}

impl QosPolicy {
    pub fn keep_all() -> Self {
        Self::History(HistoryKind::KeepAll)
    }

    pub fn keep_last(depth: u32) -> Self {
        Self::History(HistoryKind::KeepLast(depth))
    }

    pub fn reliable() -> Self {
        Self::Reliability(ReliabilityKind::Reliable)
    }

    pub fn best_effort() -> Self {
        Self::Reliability(ReliabilityKind::BestEffort)
    }

    pub fn partition<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Partition(names.into_iter().map(Into::into).collect())
    }

    pub fn time_filter(separation: u32) -> Self {
        Self::TimeFilter(separation)
    }

    pub fn durability(kind: DurabilityKind) -> Self {
        Self::Durability(kind)
    }
}

/// Policies used for topics created with an empty QoS list.
pub fn default_topic_qos() -> Vec<QosPolicy> {
    vec![QosPolicy::best_effort(), QosPolicy::keep_last(1)]
}

/// Policies used for readers created with an empty QoS list.
pub fn default_reader_qos() -> Vec<QosPolicy> {
    vec![QosPolicy::best_effort(), QosPolicy::keep_last(1)]
}

/// Policies used for writers created with an empty QoS list.
pub fn default_writer_qos() -> Vec<QosPolicy> {
    vec![QosPolicy::reliable(), QosPolicy::keep_last(1)]
}

/// Flat wire shape shared by every policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPolicy {
    id: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    k: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    v: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vs: Option<Vec<String>>,
}

impl RawPolicy {
    fn tagged(id: u8) -> Self {
        Self {
            id,
            k: None,
            v: None,
            vs: None,
        }
    }
}

impl From<QosPolicy> for RawPolicy {
    fn from(policy: QosPolicy) -> Self {
        match policy {
            QosPolicy::History(kind) => RawPolicy {
                k: Some(kind.code()),
                v: match kind {
                    HistoryKind::KeepLast(depth) => Some(i64::from(depth)),
                    HistoryKind::KeepAll => None,
                },
                ..RawPolicy::tagged(HISTORY_ID)
            },
            QosPolicy::Reliability(kind) => RawPolicy {
                k: Some(kind.code()),
                ..RawPolicy::tagged(RELIABILITY_ID)
            },
            QosPolicy::Partition(names) => RawPolicy {
                vs: Some(names),
                ..RawPolicy::tagged(PARTITION_ID)
            },
            QosPolicy::TimeFilter(value) => RawPolicy {
                v: Some(i64::from(value)),
                ..RawPolicy::tagged(TIME_FILTER_ID)
            },
            QosPolicy::Durability(kind) => RawPolicy {
                k: Some(kind.code()),
                ..RawPolicy::tagged(DURABILITY_ID)
            },
        }
    }
}

impl TryFrom<RawPolicy> for QosPolicy {
    type Error = String;

    fn try_from(raw: RawPolicy) -> Result<Self, String> {
        let kind = |name: &str| raw.k.ok_or_else(|| format!("{} policy without 'k'", name));
        match raw.id {
            HISTORY_ID => match kind("history")? {
                0 => Ok(Self::History(HistoryKind::KeepAll)),
                1 => {
                    let depth = raw.v.ok_or("keep-last history without depth")?;
                    let depth = u32::try_from(depth)
                        .map_err(|_| format!("invalid history depth {}", depth))?;
                    Ok(Self::History(HistoryKind::KeepLast(depth)))
                }
                other => Err(format!("unknown history kind {}", other)),
            },
            RELIABILITY_ID => {
                let code = kind("reliability")?;
                ReliabilityKind::from_code(code)
                    .map(Self::Reliability)
                    .ok_or_else(|| format!("unknown reliability kind {}", code))
            }
            PARTITION_ID => Ok(Self::Partition(raw.vs.unwrap_or_default())),
            TIME_FILTER_ID => {
                let value = raw.v.ok_or("time filter without 'v'")?;
                u32::try_from(value)
                    .map(Self::TimeFilter)
                    .map_err(|_| format!("invalid time filter {}", value))
            }
            DURABILITY_ID => {
                let code = kind("durability")?;
                DurabilityKind::from_code(code)
                    .map(Self::Durability)
                    .ok_or_else(|| format!("unknown durability kind {}", code))
            }
            other => Err(format!("unknown QoS policy id {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(policy: QosPolicy) -> serde_json::Value {
        serde_json::to_value(policy).expect("encode")
    }

    #[test]
    fn history_depth_only_for_keep_last() {
        assert_eq!(encode(QosPolicy::keep_last(5)), json!({"id": 0, "k": 1, "v": 5}));
        assert_eq!(encode(QosPolicy::keep_all()), json!({"id": 0, "k": 0}));
    }

    #[test]
    fn reliability_codes() {
        assert_eq!(encode(QosPolicy::reliable()), json!({"id": 1, "k": 0}));
        assert_eq!(encode(QosPolicy::best_effort()), json!({"id": 1, "k": 1}));
    }

    #[test]
    fn partition_and_time_filter() {
        assert_eq!(
            encode(QosPolicy::partition(["a", "b"])),
            json!({"id": 2, "vs": ["a", "b"]})
        );
        assert_eq!(encode(QosPolicy::time_filter(250)), json!({"id": 4, "v": 250}));
    }

    #[test]
    fn durability_codes() {
        assert_eq!(
            encode(QosPolicy::durability(DurabilityKind::Persistent)),
            json!({"id": 5, "k": 3})
        );
    }

    #[test]
    fn decode_from_server_json() {
        let list: Vec<QosPolicy> = serde_json::from_value(json!([
            {"id": 0, "k": 1, "v": 10},
            {"id": 5, "k": 1},
            {"id": 2, "vs": []}
        ]))
        .expect("decode");
        assert_eq!(
            list,
            vec![
                QosPolicy::keep_last(10),
                QosPolicy::durability(DurabilityKind::TransientLocal),
                QosPolicy::Partition(vec![]),
            ]
        );
    }

    #[test]
    fn decode_rejects_unknown_tags() {
        assert!(serde_json::from_value::<QosPolicy>(json!({"id": 3})).is_err());
        assert!(serde_json::from_value::<QosPolicy>(json!({"id": 1, "k": 7})).is_err());
        assert!(serde_json::from_value::<QosPolicy>(json!({"id": 0, "k": 1})).is_err());
    }

    #[test]
    fn default_lists() {
        assert_eq!(default_writer_qos()[0], QosPolicy::reliable());
        assert_eq!(default_reader_qos()[0], QosPolicy::best_effort());
        assert_eq!(default_topic_qos()[1], QosPolicy::keep_last(1));
    }
}
