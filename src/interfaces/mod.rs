//! Protocol interfaces
//!
//! - `frame` - OCPP-J framing
//! - `ocpp_v16` - OCPP 1.6 smart-charging actions

pub mod frame;
pub mod ocpp_v16;

pub use frame::{FrameError, OcppFrame};
pub use ocpp_v16::{AdapterError, GetCompositeScheduleReply, OcppV16Adapter};
