//!
//! # Sample archiver
//!
//! Build the `MongoDBArchiver` that enables volume snapshot backups for every
//! labelled MongoDB, using the defaults KubeDB ships with.
//!
use convert_case::{Case, Casing};
use serde_json::json;

use k8_types::{InputK8Obj, InputObjectMeta};

use kubedb_metadata::api::{AllowedConsumers, LabelSelector, ObjectReference};
use kubedb_metadata::archiver::{
    ArchiverDeletionPolicy, BackupDriver, BackupStorage, BackupTask, FullBackupOptions,
    ManifestBackupOptions, MongoDBArchiverSpec, SchedulerOptions,
};
use kubedb_metadata::defaults::{
    ARCHIVER_NAMESPACE, ARCHIVER_SELECTOR_LABEL, ARCHIVER_SELECTOR_VALUE,
    DEFAULT_BACKUP_STORAGE, DEFAULT_ENCRYPTION_SECRET, DEFAULT_FULL_BACKUP_SCHEDULE,
    DEFAULT_MANIFEST_BACKUP_SCHEDULE, DEFAULT_RETENTION_POLICY, JOB_HISTORY_LIMIT,
    SESSION_HISTORY_LIMIT, STASH_NAMESPACE,
};

/// kubernetes object name derived from a volume snapshot class name
pub fn archiver_name(service: &str) -> String {
    service.to_case(Case::Kebab)
}

/// Archiver for the volume snapshot class `service`. Pure; references are not checked.
pub fn build_archiver(service: &str) -> InputK8Obj<MongoDBArchiverSpec> {
    let spec = MongoDBArchiverSpec {
        databases: Some(AllowedConsumers::all_namespaces(LabelSelector::new_labels([
            (ARCHIVER_SELECTOR_LABEL, ARCHIVER_SELECTOR_VALUE),
        ]))),
        pause: false,
        retention_policy: Some(ObjectReference::new(
            STASH_NAMESPACE,
            DEFAULT_RETENTION_POLICY,
        )),
        encryption_secret: Some(ObjectReference::new(
            STASH_NAMESPACE,
            DEFAULT_ENCRYPTION_SECRET,
        )),
        full_backup: Some(FullBackupOptions {
            driver: BackupDriver::VolumeSnapshotter,
            task: Some(BackupTask {
                params: Some(json!({ "volumeSnapshotClassName": service })),
            }),
            scheduler: Some(SchedulerOptions::new(
                DEFAULT_FULL_BACKUP_SCHEDULE,
                JOB_HISTORY_LIMIT,
            )),
            session_history_limit: SESSION_HISTORY_LIMIT,
        }),
        wal_backup: None,
        manifest_backup: Some(ManifestBackupOptions {
            scheduler: Some(SchedulerOptions::new(
                DEFAULT_MANIFEST_BACKUP_SCHEDULE,
                JOB_HISTORY_LIMIT,
            )),
            session_history_limit: SESSION_HISTORY_LIMIT,
        }),
        backup_storage: Some(BackupStorage {
            ref_: Some(ObjectReference::new(
                STASH_NAMESPACE,
                DEFAULT_BACKUP_STORAGE,
            )),
            sub_dir: String::new(),
        }),
        deletion_policy: Some(ArchiverDeletionPolicy::WipeOut),
    };

    InputK8Obj::new(
        spec,
        InputObjectMeta::named(archiver_name(service), ARCHIVER_NAMESPACE.to_owned()),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_name_and_namespace() {
        let archiver = build_archiver("az-vsc");
        assert_eq!(archiver.metadata.name, "az-vsc");
        assert_eq!(archiver.metadata.namespace, "kubedb");

        assert_eq!(archiver_name("AzVsc"), "az-vsc");
        assert_eq!(archiver_name("gcp_snapshot_class"), "gcp-snapshot-class");
    }

    #[test]
    fn test_deterministic() {
        let first = serde_json::to_vec(&build_archiver("az-vsc")).expect("json");
        let second = serde_json::to_vec(&build_archiver("az-vsc")).expect("json");
        assert_eq!(first, second);
    }

    #[test]
    fn test_defaults() {
        let spec = build_archiver("AzVsc").spec;

        let databases = spec.databases.expect("databases");
        let selector = databases.selector.expect("selector");
        assert_eq!(
            selector.match_labels.get("kubedb.com/archiver").map(String::as_str),
            Some("true")
        );

        assert_eq!(
            spec.retention_policy,
            Some(ObjectReference::new("stash", "keep-1mo"))
        );
        assert_eq!(
            spec.encryption_secret,
            Some(ObjectReference::new("stash", "default-encryption-secret"))
        );

        let full = spec.full_backup.expect("full backup");
        assert_eq!(full.driver, BackupDriver::VolumeSnapshotter);
        // params carry the class name as given, not the normalized name
        assert_eq!(
            full.task.and_then(|task| task.params),
            Some(json!({ "volumeSnapshotClassName": "AzVsc" }))
        );
        let scheduler = full.scheduler.expect("scheduler");
        assert_eq!(scheduler.schedule, "*/50 * * * *");
        assert_eq!(scheduler.successful_jobs_history_limit, Some(1));
        assert_eq!(scheduler.failed_jobs_history_limit, Some(1));
        assert_eq!(full.session_history_limit, 2);

        let manifest = spec.manifest_backup.expect("manifest backup");
        assert_eq!(
            manifest.scheduler.map(|s| s.schedule),
            Some("0 */2 * * *".to_owned())
        );

        assert_eq!(
            spec.backup_storage.and_then(|storage| storage.ref_),
            Some(ObjectReference::new("stash", "default"))
        );
        assert_eq!(spec.deletion_policy, Some(ArchiverDeletionPolicy::WipeOut));
        assert!(spec.wal_backup.is_none());
        assert!(!spec.pause);
    }
}
