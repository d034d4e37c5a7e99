//! Reusable modules built on process variables.
//!
//! - [`FanIn`] merges several feeders of one variable through an aggregator
//!   function.
//! - [`StatusAggregator`] rolls up the status outputs of a whole branch of the
//!   module tree into one status with message. Leaf statuses come from
//!   [`StatusOutput`]/[`StatusWithMessage`] or from a [`StatusMonitor`].
//! - [`UserInputValidator`] checks inputs against predicates and reverts values
//!   which violate them.
//!
//! All three are driven by a module's own loop: read a change through a
//! [`ReadAnyGroup`](pv_runtime::ReadAnyGroup), then hand its id to the
//! component.

pub mod fan_in;
pub mod history;
pub mod status;
pub mod status_aggregator;
pub mod status_monitor;
pub mod status_with_message;
pub mod user_input_validator;

pub use fan_in::{
    fan_in_keep_last_value, Aggregator, ArrayFanIn, ArrayFanInWB, FanIn, ScalarFanIn,
    ScalarFanInWB,
};
pub use history::History;
pub use status::{reduce, PriorityMode, Reduced, Status};
pub use status_aggregator::{
    StatusAggregator, StatusAggregatorConfig, DEBUG_REQUEST_PATH, DEFAULT_WARNING_MIXED_MESSAGE,
};
pub use status_monitor::{MonitorConfig, MonitorKind, StatusMonitor};
pub use status_with_message::{StatusOutput, StatusWithMessage, StatusWithMessageInput};
pub use user_input_validator::{ErrorFunction, Guarded, UserInputValidator, Validatable};
