use super::{BackendFunction, require_non_blank};
use crate::backend::BackendRequest;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[allow(non_snake_case)]
pub struct CalendarArgs {
    /// Day to check, YYYY-MM-DD.
    pub date: String,
    /// Start time in 24h format, e.g. "14:00".
    pub startTime: String,
    /// City or timezone of the caller, used to convert times.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

pub struct CheckCalendarAvailability;

impl BackendFunction for CheckCalendarAvailability {
    type Args = CalendarArgs;
    const NAME: &'static str = "checkCalendarAvailability";
    const DESCRIPTION: &'static str =
        "Check whether a consultation slot is free and get nearby alternatives.";

    fn check(args: &Self::Args) -> Result<(), String> {
        require_non_blank("date", &args.date)?;
        require_non_blank("startTime", &args.startTime)
    }

    fn request(args: Self::Args) -> BackendRequest {
        BackendRequest::post(["calendar", "availability"], json!(args))
    }
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ConsultationArgs {
    pub client_name: String,
    /// Email address or phone number.
    pub contact_method: String,
    /// What the client wants to build.
    pub project_description: String,
    /// "scheduled", "follow_up" or "not_interested".
    pub consultation_outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_challenges: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_range: Option<String>,
    /// YYYY-MM-DD, only when a slot was agreed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_time: Option<String>,
}

pub struct ScheduleConsultation;

impl BackendFunction for ScheduleConsultation {
    type Args = ConsultationArgs;
    const NAME: &'static str = "scheduleConsultation";
    const DESCRIPTION: &'static str =
        "Register a consultation request with everything learned during the call.";
    const MUTATING: bool = true;

    fn check(args: &Self::Args) -> Result<(), String> {
        require_non_blank("client_name", &args.client_name)?;
        require_non_blank("contact_method", &args.contact_method)?;
        require_non_blank("consultation_outcome", &args.consultation_outcome)
    }

    fn request(args: Self::Args) -> BackendRequest {
        BackendRequest::post(["consultations"], json!(args))
    }
}
