//! Task lifecycle: start/stop/remove through the automation port

mod controller;
pub mod port;

pub use controller::{LifecycleController, STARTING_MESSAGE};
pub use port::{
    AutomationPort, Delays, LoggingPort, PortCall, PortError, RateRequest, RateResponse, RecordingPort, StartOptions,
};
