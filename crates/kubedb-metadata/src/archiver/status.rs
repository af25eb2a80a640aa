use serde::{Deserialize, Serialize};

use crate::api::Condition;

#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongoDBArchiverStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub database_refs: Vec<ArchiverDatabaseRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Database currently backed up by an archiver
#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArchiverDatabaseRef {
    pub name: String,
    pub namespace: String,
}
