use serde::{Deserialize, Serialize};

use super::LabelSelector;

/// Which database objects a policy object applies to
#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllowedConsumers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<ConsumerNamespaces>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerNamespaces {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<FromNamespaces>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, Copy, Eq, PartialEq)]
pub enum FromNamespaces {
    All,
    #[default]
    Same,
    Selector,
}

impl AllowedConsumers {
    /// objects in every namespace whose labels match `selector`
    pub fn all_namespaces(selector: LabelSelector) -> Self {
        Self {
            namespaces: Some(ConsumerNamespaces {
                from: Some(FromNamespaces::All),
                selector: None,
            }),
            selector: Some(selector),
        }
    }
}
