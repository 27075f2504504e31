//! Occupancy Lighting Library
//!
//! Turns object detections from a camera into smooth, safety-bounded light
//! commands.
//!
//! ## Architecture (5 Components)
//!
//! 1. FrameSourceRegistry - Camera sources, live switching
//! 2. DetectionAdapter - Frame to occupancy count
//! 3. OccupancySmoother - Debounced brightness target
//! 4. LightActuator - Safety envelope, transport, reconnect/backoff
//! 5. PipelineOrchestrator - Capture loop and control commands
//!
//! ## Data Flow
//!
//! Frame source -> detection -> smoother -> actuator -> transport.
//! The Control API (WebAPI) only issues orchestrator commands.

pub mod activity_log;
pub mod actuator;
pub mod backoff;
pub mod clock;
pub mod detection;
pub mod error;
pub mod frame_source;
pub mod models;
pub mod orchestrator;
pub mod pipeline_config;
pub mod smoother;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
