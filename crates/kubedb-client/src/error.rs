use k8_client::meta_client::ObjectKeyNotFound;
use k8_types::{MetaStatus, StatusEnum};

use crate::scheme::{SchemeError, TypeKey};

pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_CONFLICT: u16 = 409;
pub const STATUS_INVALID: u16 = 422;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("type {0} is not registered in the scheme")]
    NotRegistered(TypeKey),
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: String },
    #[error("conflict on {kind} {key}: {message}")]
    Conflict {
        kind: String,
        key: String,
        message: String,
    },
    #[error("invalid {kind} {key}: {message}")]
    Invalid {
        kind: String,
        key: String,
        message: String,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Scheme(#[from] SchemeError),
    #[error("store client error: {0}")]
    Client(#[source] anyhow::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// map a client error onto the store taxonomy using the api status code
    pub fn classify(err: anyhow::Error, kind: &str, key: &str) -> Self {
        if err.downcast_ref::<ObjectKeyNotFound>().is_some() {
            return Self::NotFound {
                kind: kind.to_owned(),
                key: key.to_owned(),
            };
        }

        // the client surfaces a failed call as the decoded api status
        let Some(status) = err.downcast_ref::<MetaStatus>() else {
            return Self::Client(err);
        };

        let message = status
            .message
            .clone()
            .or_else(|| status.reason.clone())
            .unwrap_or_default();

        match status.code {
            Some(STATUS_NOT_FOUND) => Self::NotFound {
                kind: kind.to_owned(),
                key: key.to_owned(),
            },
            Some(STATUS_CONFLICT) => Self::Conflict {
                kind: kind.to_owned(),
                key: key.to_owned(),
                message,
            },
            Some(STATUS_INVALID) => Self::Invalid {
                kind: kind.to_owned(),
                key: key.to_owned(),
                message,
            },
            _ => Self::Client(err),
        }
    }
}

/// failure status as the api server reports it
pub fn failure_status(code: u16, reason: &str, message: impl Into<String>) -> MetaStatus {
    MetaStatus {
        api_version: "v1".to_owned(),
        code: Some(code),
        details: None,
        kind: "Status".to_owned(),
        reason: Some(reason.to_owned()),
        status: StatusEnum::FAILURE,
        message: Some(message.into()),
    }
}

/// error returned by a client for a failed api call
pub fn api_error(code: u16, reason: &str, message: impl Into<String>) -> anyhow::Error {
    failure_status(code, reason, message).into()
}
