use serde::{Deserialize, Serialize};

/// A registered model in the twin graph catalog. Only `id` is consumed by this
/// crate; the remaining fields are carried through for consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decommissioned: Option<bool>,
}

/// One page of the model listing, with an opaque continuation link when more
/// pages remain.
#[derive(Debug, Deserialize)]
pub struct ModelPage {
    pub value: Vec<ModelDescriptor>,
    #[serde(rename = "nextLink", default)]
    pub next_link: Option<String>,
}
