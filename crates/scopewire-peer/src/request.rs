use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A request kind with a stable identifier and an associated response type.
///
/// Pairs a request body with its response at the type level, so callers
/// cannot send a request and decode the wrong response schema:
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use scopewire_peer::ServiceRequest;
///
/// #[derive(Serialize, Deserialize)]
/// struct Add { a: i64, b: i64 }
///
/// #[derive(Serialize, Deserialize)]
/// struct Sum { value: i64 }
///
/// impl ServiceRequest for Add {
///     type Response = Sum;
///     const IDENTIFIER: &'static str = "com.scopewire.Add";
/// }
/// ```
pub trait ServiceRequest: Serialize + DeserializeOwned + Send + 'static {
    /// The response body this request resolves to.
    type Response: Serialize + DeserializeOwned + Send + 'static;

    /// Stable wire identifier for this request kind.
    const IDENTIFIER: &'static str;
}

/// The response type for requests that return nothing.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoidResponse {}

impl VoidResponse {
    pub const EMPTY: VoidResponse = VoidResponse {};
}
