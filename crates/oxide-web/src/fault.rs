//! Faults raised by callbacks and the type tags used to route them to
//! error handlers.
//!
//! Fault types form a tree through their `parent` link. When a callback
//! fails, the dispatcher walks the fault's ancestry from the most derived
//! type upwards and picks the first registered handler at the nearest level.
//!
//! ```
//! use oxide_web::FaultType;
//!
//! static NOT_ENOUGH_FUNDS: FaultType = FaultType::derive("NotEnoughFunds", &FaultType::ILLEGAL_STATE);
//!
//! assert!(NOT_ENOUGH_FUNDS.is_a(&FaultType::ILLEGAL_STATE));
//! assert!(NOT_ENOUGH_FUNDS.is_a(&FaultType::ANY));
//! assert!(!FaultType::ILLEGAL_STATE.is_a(&NOT_ENOUGH_FUNDS));
//! ```

use std::fmt;

use thiserror::Error;

use crate::error::WebError;

/// A fault type tag with its declared supertype.
///
/// Identity is the name: two tags with the same name are the same type.
#[derive(Debug, Clone, Copy)]
pub struct FaultType {
    name: &'static str,
    parent: Option<&'static FaultType>,
}

impl FaultType {
    /// Root of every fault type.
    pub const ANY: Self = Self::root("Fault");
    /// Faults carrying an HTTP status. Halts are offered to handlers of this
    /// type when no status handler intercepts them.
    pub const CODED: Self = Self::derive("CodedFault", &Self::ANY);
    /// The callback reached a state it cannot proceed from.
    pub const ILLEGAL_STATE: Self = Self::derive("IllegalState", &Self::ANY);
    /// The request carried unusable input.
    pub const ILLEGAL_ARGUMENT: Self = Self::derive("IllegalArgument", &Self::ANY);
    /// The request body could not be decoded.
    pub const BODY: Self = Self::derive("BodyFault", &Self::ILLEGAL_ARGUMENT);
    /// A callback panicked.
    pub const PANIC: Self = Self::derive("Panic", &Self::ANY);

    /// Declares a type without supertype.
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// Declares a subtype of `parent`.
    pub const fn derive(name: &'static str, parent: &'static Self) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    /// Type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared supertype.
    pub fn parent(&self) -> Option<&'static Self> {
        self.parent
    }

    /// Returns whether `self` is `other` or one of its subtypes.
    pub fn is_a(&self, other: &Self) -> bool {
        self.distance_to(other).is_some()
    }

    /// Number of inheritance steps from `self` up to `ancestor`.
    pub fn distance_to(&self, ancestor: &Self) -> Option<usize> {
        self.ancestry().position(|t| t == *ancestor)
    }

    /// `self` followed by every supertype, nearest first.
    pub fn ancestry(&self) -> impl Iterator<Item = Self> {
        std::iter::successors(Some(*self), |t| t.parent.copied())
    }
}

impl PartialEq for FaultType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for FaultType {}

impl fmt::Display for FaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A failure raised while a callback handles a request.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct Fault {
    kind: FaultType,
    message: String,
    status: Option<u16>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Fault {
    /// Creates a fault of the given type.
    pub fn new(kind: FaultType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// A fault carrying an HTTP status.
    pub fn coded(status: u16, message: impl Into<String>) -> Self {
        Self::new(FaultType::CODED, message).with_status(status)
    }

    /// An [`FaultType::ILLEGAL_STATE`] fault.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new(FaultType::ILLEGAL_STATE, message)
    }

    /// An [`FaultType::ILLEGAL_ARGUMENT`] fault.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::new(FaultType::ILLEGAL_ARGUMENT, message)
    }

    /// Attaches a status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches the underlying error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Fault type.
    pub fn kind(&self) -> FaultType {
        self.kind
    }

    /// Message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Status, for coded faults.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Returns whether this fault is an instance of `kind`.
    pub fn is_a(&self, kind: &FaultType) -> bool {
        self.kind.is_a(kind)
    }
}

impl From<WebError> for Fault {
    fn from(err: WebError) -> Self {
        let kind = match &err {
            WebError::Codec { .. } | WebError::Json(_) => FaultType::BODY,
            WebError::InvalidPattern { .. } | WebError::InvalidSettings(_) => {
                FaultType::ILLEGAL_ARGUMENT
            }
            _ => FaultType::ILLEGAL_STATE,
        };
        Self::new(kind, err.to_string()).with_source(err)
    }
}

impl From<serde_json::Error> for Fault {
    fn from(err: serde_json::Error) -> Self {
        Self::new(FaultType::BODY, err.to_string()).with_source(err)
    }
}

impl From<std::io::Error> for Fault {
    fn from(err: std::io::Error) -> Self {
        Self::illegal_state(err.to_string()).with_source(err)
    }
}
