use super::{BackendFunction, require_non_blank};
use crate::backend::BackendRequest;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[allow(non_snake_case)]
pub struct AvailabilityArgs {
    /// Requested day, YYYY-MM-DD.
    pub date: String,
    /// Preferred times on that day, e.g. "10:30 AM".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeSlots: Option<Vec<String>>,
}

pub struct CheckAppointmentAvailability;

impl BackendFunction for CheckAppointmentAvailability {
    type Args = AvailabilityArgs;
    const NAME: &'static str = "checkAppointmentAvailability";
    const DESCRIPTION: &'static str =
        "Check which appointment slots are free on a given date.";

    fn check(args: &Self::Args) -> Result<(), String> {
        require_non_blank("date", &args.date)
    }

    fn request(args: Self::Args) -> BackendRequest {
        BackendRequest::post(["appointments", "availability"], json!(args))
    }
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[allow(non_snake_case)]
pub struct AppointmentArgs {
    /// Full name of the patient.
    pub patientName: String,
    /// Whether the patient has visited before.
    pub isReturningPatient: bool,
    /// Kind of visit, e.g. "cleaning", "consultation", "emergency".
    pub appointmentType: String,
    /// Agreed date and time of the appointment.
    pub appointmentTime: String,
    /// How the patient wants to be reminded: "text", "email" or "call".
    pub reminderPreference: String,
}

pub struct CreateAppointment;

impl BackendFunction for CreateAppointment {
    type Args = AppointmentArgs;
    const NAME: &'static str = "createAppointment";
    const DESCRIPTION: &'static str =
        "Book an appointment once the patient has confirmed every detail.";
    const MUTATING: bool = true;

    fn check(args: &Self::Args) -> Result<(), String> {
        require_non_blank("patientName", &args.patientName)?;
        require_non_blank("appointmentType", &args.appointmentType)?;
        require_non_blank("appointmentTime", &args.appointmentTime)
    }

    fn request(args: Self::Args) -> BackendRequest {
        BackendRequest::post(["appointments"], json!(args))
    }
}
