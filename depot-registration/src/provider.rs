//! Interfaces to the external identity provider and the host-naming
//! collaborator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;

/// Fact carrying the hardware identifier.
pub const DMI_UUID_FACT: &str = "dmi.system.uuid";

/// Consumer attributes never copied back from the provider: guest lists
/// change on every check-in and facts are owned by the host.
pub const VOLATILE_ATTRIBUTES: &[&str] = &["guestIds", "facts"];

/// Attributes of a consumer that are mirrored onto the subscription facet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_ver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoheal: Option<bool>,
    /// Entitlement status label (`valid`, `partial`, `invalid`, `disabled`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entitlement_status: Option<String>,
}

impl ConsumerAttributes {
    /// Parse a raw attribute map, dropping [`VOLATILE_ATTRIBUTES`].
    pub fn from_raw(mut raw: Map<String, Value>) -> Result<Self, serde_json::Error> {
        for key in VOLATILE_ATTRIBUTES {
            raw.remove(*key);
        }
        serde_json::from_value(Value::Object(raw))
    }
}

/// Parameters a host presents when registering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerParams {
    /// Consumer uuid requested by the client; a random one is used otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default)]
    pub facts: BTreeMap<String, String>,
    #[serde(flatten)]
    pub attributes: ConsumerAttributes,
}

impl ConsumerParams {
    pub fn dmi_uuid(&self) -> Option<&str> {
        self.facts.get(DMI_UUID_FACT).map(String::as_str)
    }
}

/// The external identity provider holding consumer records.
pub trait IdentityProvider {
    /// Create a consumer in the environment identified by `environment_cp_id`.
    /// Returns the consumer uuid the provider assigned.
    fn create_consumer(
        &self,
        environment_cp_id: &str,
        params: &ConsumerParams,
        activation_keys: &[String],
    ) -> Result<String, ProviderError>;

    fn destroy_consumer(&self, uuid: &str) -> Result<(), ProviderError>;

    /// Raw consumer attributes, as the provider reports them.
    fn consumer_attributes(&self, uuid: &str) -> Result<Map<String, Value>, ProviderError>;

    fn ping(&self) -> Result<(), ProviderError>;
}

/// Proposes the hostname a registering host is known by.
pub trait HostNaming {
    fn propose_hostname(&self, facts: &BTreeMap<String, String>) -> Option<String>;
}

/// Hostname from reported network facts.
///
/// Precedence: `network.fqdn`, then `network.hostname-override`, then
/// `network.hostname`. Empty values and `localhost` are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct FactsHostNaming;

const HOSTNAME_FACTS: &[&str] = &["network.fqdn", "network.hostname-override", "network.hostname"];

impl HostNaming for FactsHostNaming {
    fn propose_hostname(&self, facts: &BTreeMap<String, String>) -> Option<String> {
        HOSTNAME_FACTS
            .iter()
            .filter_map(|key| facts.get(*key))
            .map(|name| name.trim())
            .find(|name| !name.is_empty() && !name.eq_ignore_ascii_case("localhost"))
            .map(str::to_lowercase)
    }
}
