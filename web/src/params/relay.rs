use serde::Deserialize;
use utoipa::IntoParams;

/// Query parameters of a device poll
///
/// # Fields
///
/// * `localip` - The client key to poll for. Optional at the type level so a
///   missing value is reported as a validation error rather than a query rejection.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct PollParams {
    /// Client key (the device's local address)
    pub(crate) localip: Option<String>,
}
