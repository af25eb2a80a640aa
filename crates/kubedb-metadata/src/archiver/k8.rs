use crate::k8_types::{Crd, CrdNames, DefaultHeader, Spec, Status};
use crate::defaults::{ARCHIVER_GROUP, ARCHIVER_VERSION};

use super::MongoDBArchiverSpec;
use super::MongoDBArchiverStatus;

const MONGODB_ARCHIVER_API: Crd = Crd {
    group: ARCHIVER_GROUP,
    version: ARCHIVER_VERSION,
    names: CrdNames {
        kind: "MongoDBArchiver",
        plural: "mongodbarchivers",
        singular: "mongodbarchiver",
    },
};

impl Spec for MongoDBArchiverSpec {
    type Status = MongoDBArchiverStatus;
    type Header = DefaultHeader;

    fn metadata() -> &'static Crd {
        &MONGODB_ARCHIVER_API
    }
}

impl Status for MongoDBArchiverStatus {}
