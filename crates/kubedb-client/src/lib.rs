//!
//! # KubeDB client
//!
//! Typed access to a Kubernetes store holding KubeDB resources:
//! connection resolution, a type registry, a store client with
//! merge-patch helpers and a client side field index.
//!
pub mod cache;
pub mod connection;
pub mod error;
pub mod memory;
pub mod merge_patch;
pub mod scheme;
pub mod selector;
pub mod store;

pub use self::connection::{connect, resolve_connection, ConnectionError};
pub use self::error::StoreError;
pub use self::scheme::{Scheme, SchemeBuilder, SchemeError};
pub use self::selector::FieldSelector;
pub use self::store::{StoreClient, Verb};

pub use k8_client;
pub use k8_types;
pub use kubedb_metadata as metadata;
