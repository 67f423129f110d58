use super::{BackendFunction, require_non_blank};
use crate::backend::BackendRequest;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[allow(non_snake_case)]
pub struct ChangeBookingArgs {
    /// Six-character booking reference.
    #[serde(skip_serializing)]
    pub bookingCode: String,
    /// New travel date, YYYY-MM-DD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newDate: Option<String>,
    /// New flight number, e.g. "IB3170".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newFlightNumber: Option<String>,
}

pub struct ChangeBooking;

impl BackendFunction for ChangeBooking {
    type Args = ChangeBookingArgs;
    const NAME: &'static str = "changeBooking";
    const DESCRIPTION: &'static str = "Move a booking to another date or flight.";
    const MUTATING: bool = true;

    fn check(args: &Self::Args) -> Result<(), String> {
        require_non_blank("bookingCode", &args.bookingCode)?;
        if args.newDate.is_none() && args.newFlightNumber.is_none() {
            return Err("either `newDate` or `newFlightNumber` is required".to_string());
        }
        Ok(())
    }

    fn request(args: Self::Args) -> BackendRequest {
        let code = args.bookingCode.trim().to_uppercase();
        BackendRequest::post(["bookings", code.as_str(), "change"], json!(args))
    }
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[allow(non_snake_case)]
pub struct CheckInArgs {
    /// Six-character booking reference.
    #[serde(skip_serializing)]
    pub bookingCode: String,
    /// Frequent flyer number, when the passenger has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loyaltyNumber: Option<String>,
    /// "window", "aisle" or "middle".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seatPreference: Option<String>,
}

pub struct CheckInPassenger;

impl BackendFunction for CheckInPassenger {
    type Args = CheckInArgs;
    const NAME: &'static str = "checkInPassenger";
    const DESCRIPTION: &'static str = "Check a passenger in for their flight.";
    const MUTATING: bool = true;

    fn check(args: &Self::Args) -> Result<(), String> {
        require_non_blank("bookingCode", &args.bookingCode)
    }

    fn request(args: Self::Args) -> BackendRequest {
        let code = args.bookingCode.trim().to_uppercase();
        BackendRequest::post(["bookings", code.as_str(), "check-in"], json!(args))
    }
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[allow(non_snake_case)]
pub struct LostBaggageArgs {
    /// Code printed on the baggage tag.
    pub baggageCode: String,
    pub passengerName: String,
    /// Airport or place where the bag was last seen.
    pub lastSeenLocation: String,
}

pub struct ReportLostBaggage;

impl BackendFunction for ReportLostBaggage {
    type Args = LostBaggageArgs;
    const NAME: &'static str = "reportLostBaggage";
    const DESCRIPTION: &'static str = "File a lost baggage report.";
    const MUTATING: bool = true;

    fn check(args: &Self::Args) -> Result<(), String> {
        require_non_blank("baggageCode", &args.baggageCode)?;
        require_non_blank("passengerName", &args.passengerName)
    }

    fn request(args: Self::Args) -> BackendRequest {
        BackendRequest::post(["baggage", "lost"], json!(args))
    }
}
