//! This module holds typed parameters for various endpoint inputs.
//!
//! By using typed parameters, the inputs are validated (by type) and correctly
//! formatted before they reach the relay.

pub(crate) mod relay;
