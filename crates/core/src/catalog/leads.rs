use super::{BackendFunction, require_non_blank};
use crate::backend::BackendRequest;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct LeadArgs {
    /// How the call ended: "interested", "callback", "not_interested" or "wrong_number".
    pub call_outcome: String,
    /// Current coverage, e.g. "employer", "marketplace", "none".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_type: Option<String>,
    /// Whether the premium went up, down or stayed the same.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium_change: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tobacco_user: Option<bool>,
    /// The caller's objection in their own words, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objection_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

pub struct CaptureLead;

impl BackendFunction for CaptureLead {
    type Args = LeadArgs;
    const NAME: &'static str = "captureLead";
    const DESCRIPTION: &'static str =
        "Record the outcome of the call and any qualification details gathered.";
    const MUTATING: bool = true;

    fn check(args: &Self::Args) -> Result<(), String> {
        require_non_blank("call_outcome", &args.call_outcome)
    }

    fn request(args: Self::Args) -> BackendRequest {
        BackendRequest::post(["leads"], json!(args))
    }
}
