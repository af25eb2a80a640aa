//!
//! # MongoDB Archiver Spec
//!
//! Continuous backup configuration picked up by every `MongoDB` whose labels
//! match `databases`.
//!
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api::{AllowedConsumers, ObjectReference};
use crate::is_false;

#[derive(Deserialize, Serialize, Default, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongoDBArchiverSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub databases: Option<AllowedConsumers>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub pause: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_policy: Option<ObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_secret: Option<ObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_backup: Option<FullBackupOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wal_backup: Option<WalBackupOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_backup: Option<ManifestBackupOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_storage: Option<BackupStorage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<ArchiverDeletionPolicy>,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FullBackupOptions {
    #[serde(default)]
    pub driver: BackupDriver,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<BackupTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerOptions>,
    #[serde(default)]
    pub session_history_limit: i32,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestBackupOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerOptions>,
    #[serde(default)]
    pub session_history_limit: i32,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WalBackupOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_secret: Option<ObjectReference>,
}

/// Driver specific parameters, passed through as raw json
#[derive(Deserialize, Serialize, Default, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerOptions {
    pub schedule: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub concurrency_policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_jobs_history_limit: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_jobs_history_limit: Option<i32>,
}

impl SchedulerOptions {
    pub fn new(schedule: impl Into<String>, history_limit: i32) -> Self {
        Self {
            schedule: schedule.into(),
            concurrency_policy: String::new(),
            successful_jobs_history_limit: Some(history_limit),
            failed_jobs_history_limit: Some(history_limit),
        }
    }
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupStorage {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub ref_: Option<ObjectReference>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_dir: String,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Copy, Eq, PartialEq)]
pub enum BackupDriver {
    #[default]
    Restic,
    WalG,
    VolumeSnapshotter,
}

impl fmt::Display for BackupDriver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Restic => "Restic",
            Self::WalG => "WalG",
            Self::VolumeSnapshotter => "VolumeSnapshotter",
        };
        write!(f, "{name}")
    }
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ArchiverDeletionPolicy {
    #[default]
    Delete,
    WipeOut,
    DoNotDelete,
}
