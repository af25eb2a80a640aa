// CRD groups and versions
pub const KUBEDB_GROUP: &str = "kubedb.com";
pub const KUBEDB_VERSION: &str = "v1alpha2";
pub const ARCHIVER_GROUP: &str = "archiver.kubedb.com";
pub const ARCHIVER_VERSION: &str = "v1alpha1";

// Archiver placement
pub const ARCHIVER_NAMESPACE: &str = "kubedb";
pub const STASH_NAMESPACE: &str = "stash";

// Archiver defaults
pub const DEFAULT_RETENTION_POLICY: &str = "keep-1mo";
pub const DEFAULT_ENCRYPTION_SECRET: &str = "default-encryption-secret";
pub const DEFAULT_FULL_BACKUP_SCHEDULE: &str = "*/50 * * * *";
pub const DEFAULT_MANIFEST_BACKUP_SCHEDULE: &str = "0 */2 * * *";
pub const DEFAULT_BACKUP_STORAGE: &str = "default";
pub const SESSION_HISTORY_LIMIT: i32 = 2;
pub const JOB_HISTORY_LIMIT: i32 = 1;
pub const ARCHIVER_SELECTOR_LABEL: &str = "kubedb.com/archiver";
pub const ARCHIVER_SELECTOR_VALUE: &str = "true";

// MongoDB
pub const MONGODB_CONTAINER_NAME: &str = "mongodb";
