//! Event type tags.
//!
//! The tag is what the source registry stores per source name; it decides
//! how an event's payload is snapshotted and restored.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Events fired directly by the platform's hook mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    Install,
    Start,
    Stop,
    Remove,
    UpdateStatus,
    ConfigChanged,
    UpgradeCharm,
    PreSeriesUpgrade,
    PostSeriesUpgrade,
    LeaderElected,
    LeaderSettingsChanged,
    CollectMetrics,
}

impl HookKind {
    /// All built-in hook kinds.
    pub const ALL: [HookKind; 12] = [
        HookKind::Install,
        HookKind::Start,
        HookKind::Stop,
        HookKind::Remove,
        HookKind::UpdateStatus,
        HookKind::ConfigChanged,
        HookKind::UpgradeCharm,
        HookKind::PreSeriesUpgrade,
        HookKind::PostSeriesUpgrade,
        HookKind::LeaderElected,
        HookKind::LeaderSettingsChanged,
        HookKind::CollectMetrics,
    ];

    /// The source name (`config_changed`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Install => "install",
            HookKind::Start => "start",
            HookKind::Stop => "stop",
            HookKind::Remove => "remove",
            HookKind::UpdateStatus => "update_status",
            HookKind::ConfigChanged => "config_changed",
            HookKind::UpgradeCharm => "upgrade_charm",
            HookKind::PreSeriesUpgrade => "pre_series_upgrade",
            HookKind::PostSeriesUpgrade => "post_series_upgrade",
            HookKind::LeaderElected => "leader_elected",
            HookKind::LeaderSettingsChanged => "leader_settings_changed",
            HookKind::CollectMetrics => "collect_metrics",
        }
    }
}

/// Relation lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationPhase {
    Joined,
    Changed,
    Departed,
    Broken,
}

impl RelationPhase {
    pub const ALL: [RelationPhase; 4] = [
        RelationPhase::Joined,
        RelationPhase::Changed,
        RelationPhase::Departed,
        RelationPhase::Broken,
    ];

    /// Suffix appended to the relation name (`relation_changed`).
    pub fn suffix(&self) -> &'static str {
        match self {
            RelationPhase::Joined => "relation_joined",
            RelationPhase::Changed => "relation_changed",
            RelationPhase::Departed => "relation_departed",
            RelationPhase::Broken => "relation_broken",
        }
    }
}

/// Storage lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoragePhase {
    Attached,
    Detaching,
}

impl StoragePhase {
    pub const ALL: [StoragePhase; 2] = [StoragePhase::Attached, StoragePhase::Detaching];

    pub fn suffix(&self) -> &'static str {
        match self {
            StoragePhase::Attached => "storage_attached",
            StoragePhase::Detaching => "storage_detaching",
        }
    }
}

/// Type tag of an event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "phase")]
pub enum EventType {
    Hook(HookKind),
    Relation(RelationPhase),
    Storage(StoragePhase),
    Action,
    /// Events defined by charm code rather than the platform.
    Custom,
    PreCommit,
    Commit,
}

impl EventType {
    /// Whether handlers may defer the event.
    ///
    /// Action events need a reply before the invoking process exits.
    pub fn is_deferrable(&self) -> bool {
        !matches!(self, EventType::Action)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Hook(kind) => write!(f, "{}", kind.as_str()),
            EventType::Relation(phase) => write!(f, "{}", phase.suffix()),
            EventType::Storage(phase) => write!(f, "{}", phase.suffix()),
            EventType::Action => write!(f, "action"),
            EventType::Custom => write!(f, "custom"),
            EventType::PreCommit => write!(f, "pre_commit"),
            EventType::Commit => write!(f, "commit"),
        }
    }
}
