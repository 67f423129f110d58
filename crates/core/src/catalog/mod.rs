//! Function Catalog
//!
//! Every backend action the model may invoke is a [`BackendFunction`]: a
//! typed argument struct plus the single backend request it maps to. The
//! argument struct doubles as the parameter schema shown to the model, so the
//! schema and the validation can never drift apart.
//!
//! Functions are grouped into one immutable [`FunctionSet`] per [`Mode`].

mod airline;
mod appointments;
mod jarvis;
mod leads;
mod orders;

pub use airline::{ChangeBooking, CheckInPassenger, ReportLostBaggage};
pub use appointments::{CheckAppointmentAvailability, CreateAppointment};
pub use jarvis::{CheckCalendarAvailability, ScheduleConsultation};
pub use leads::CaptureLead;
pub use orders::{
    CheckClientId, CreateOrder, CreateSingleProductOrder, FinishOrder, GetOrdersByClientId,
    SearchProducts,
};

use crate::backend::BackendRequest;
use crate::mode::{Mode, UnknownModeError};
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A business action backed by exactly one backend request.
pub trait BackendFunction {
    /// Arguments as sent by the model. Unknown fields must be rejected.
    type Args: DeserializeOwned + JsonSchema;

    const NAME: &'static str;
    const DESCRIPTION: &'static str;
    /// Whether the backend call changes state (orders, bookings, leads...).
    const MUTATING: bool = false;

    /// Semantic checks serde cannot express, such as non-blank identifiers.
    fn check(_args: &Self::Args) -> Result<(), String> {
        Ok(())
    }

    fn request(args: Self::Args) -> BackendRequest;
}

/// What the model sees about a function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the argument object.
    pub parameters: Value,
    #[serde(skip)]
    pub mutating: bool,
}

impl FunctionSpec {
    /// Names listed under the schema's `required` key.
    pub fn required_params(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

type PrepareFn = fn(Value) -> Result<BackendRequest, String>;

/// A registered function: its spec and the typed argument decoder behind it.
#[derive(Clone)]
pub struct FunctionHandler {
    spec: FunctionSpec,
    prepare: PrepareFn,
}

impl FunctionHandler {
    pub fn of<F: BackendFunction>() -> Self {
        Self {
            spec: FunctionSpec {
                name: F::NAME.to_string(),
                description: F::DESCRIPTION.to_string(),
                parameters: parameters_schema::<F::Args>(),
                mutating: F::MUTATING,
            },
            prepare: prepare_with::<F>,
        }
    }

    pub fn spec(&self) -> &FunctionSpec {
        &self.spec
    }

    /// Decodes and checks `args`, returning the backend request on success
    /// and a human-readable reason otherwise.
    pub fn prepare(&self, args: Value) -> Result<BackendRequest, String> {
        (self.prepare)(args)
    }
}

impl std::fmt::Debug for FunctionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionHandler")
            .field("name", &self.spec.name)
            .finish()
    }
}

fn prepare_with<F: BackendFunction>(args: Value) -> Result<BackendRequest, String> {
    let args = match args {
        Value::Null => json!({}),
        other => other,
    };
    let typed: F::Args = serde_json::from_value(args).map_err(|e| e.to_string())?;
    F::check(&typed)?;
    Ok(F::request(typed))
}

fn parameters_schema<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| json!({ "type": "object" }));
    if let Value::Object(map) = &mut schema {
        map.remove("$schema");
        map.remove("title");
    }
    schema
}

pub(crate) fn require_non_blank(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("`{}` must not be empty", field))
    } else {
        Ok(())
    }
}

/// Errors detected while assembling the catalog at startup.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Function '{name}' is registered twice for mode '{mode}'")]
    DuplicateFunction { mode: Mode, name: String },
    #[error("Mode '{0}' has no functions")]
    EmptySet(Mode),
    #[error("No function set registered for mode '{0}'")]
    MissingMode(Mode),
}

/// The ordered, name-unique functions available in one mode.
#[derive(Debug)]
pub struct FunctionSet {
    mode: Mode,
    handlers: Vec<FunctionHandler>,
}

impl FunctionSet {
    pub fn new(mode: Mode, handlers: Vec<FunctionHandler>) -> Result<Self, CatalogError> {
        if handlers.is_empty() {
            return Err(CatalogError::EmptySet(mode));
        }
        let mut seen = HashSet::new();
        for handler in &handlers {
            if !seen.insert(handler.spec.name.as_str()) {
                return Err(CatalogError::DuplicateFunction {
                    mode,
                    name: handler.spec.name.clone(),
                });
            }
        }
        Ok(Self { mode, handlers })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn get(&self, name: &str) -> Option<&FunctionHandler> {
        self.handlers.iter().find(|h| h.spec.name == name)
    }

    pub fn specs(&self) -> impl Iterator<Item = &FunctionSpec> {
        self.handlers.iter().map(FunctionHandler::spec)
    }

    pub fn names(&self) -> Vec<&str> {
        self.specs().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

fn builtin_handlers(mode: Mode) -> Vec<FunctionHandler> {
    match mode {
        Mode::Orders => vec![
            FunctionHandler::of::<CheckClientId>(),
            FunctionHandler::of::<SearchProducts>(),
            FunctionHandler::of::<CreateOrder>(),
            FunctionHandler::of::<CreateSingleProductOrder>(),
            FunctionHandler::of::<FinishOrder>(),
            FunctionHandler::of::<GetOrdersByClientId>(),
        ],
        Mode::Appointments => vec![
            FunctionHandler::of::<CheckAppointmentAvailability>(),
            FunctionHandler::of::<CreateAppointment>(),
        ],
        Mode::Leads => vec![FunctionHandler::of::<CaptureLead>()],
        Mode::Airline => vec![
            FunctionHandler::of::<ChangeBooking>(),
            FunctionHandler::of::<CheckInPassenger>(),
            FunctionHandler::of::<ReportLostBaggage>(),
        ],
        Mode::Jarvis => vec![
            FunctionHandler::of::<CheckCalendarAvailability>(),
            FunctionHandler::of::<ScheduleConsultation>(),
        ],
    }
}

/// Read-only lookup from mode to its function set.
#[derive(Debug, Clone)]
pub struct FunctionCatalog {
    sets: HashMap<Mode, Arc<FunctionSet>>,
}

impl FunctionCatalog {
    /// Builds and verifies the catalog of every built-in function.
    pub fn builtin() -> Result<Self, CatalogError> {
        let sets = Mode::ALL
            .into_iter()
            .map(|mode| FunctionSet::new(mode, builtin_handlers(mode)))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_sets(sets)
    }

    /// Verifies that every mode has a set.
    pub fn from_sets(sets: impl IntoIterator<Item = FunctionSet>) -> Result<Self, CatalogError> {
        let sets: HashMap<Mode, Arc<FunctionSet>> = sets
            .into_iter()
            .map(|set| (set.mode, Arc::new(set)))
            .collect();
        for mode in Mode::ALL {
            if !sets.contains_key(&mode) {
                return Err(CatalogError::MissingMode(mode));
            }
        }
        Ok(Self { sets })
    }

    pub fn get_functions(&self, mode: Mode) -> Result<Arc<FunctionSet>, UnknownModeError> {
        self.sets
            .get(&mode)
            .cloned()
            .ok_or_else(|| UnknownModeError(mode.to_string()))
    }

    pub fn get_functions_by_name(&self, name: &str) -> Result<Arc<FunctionSet>, UnknownModeError> {
        self.get_functions(name.parse()?)
    }
}
