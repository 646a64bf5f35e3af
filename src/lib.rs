//! Reader for ArduPilot DataFlash logs: self-describing binary/text
//! telemetry streams produced by autopilot firmware.
//!
//! See [`reader::Reader`] for the main entry point.

pub mod clock;
pub mod codec;
pub mod error;
pub mod format;
pub mod framing;
pub mod index;
pub mod message;
pub mod reader;
pub mod registry;
pub mod text;
pub mod value;
pub mod vehicle;

pub use error::{DfError, DfResult};
pub use message::Message;
pub use reader::{Reader, ReaderOptions, VehicleType};
pub use value::Value;
