//! Error taxonomy for the parser engine.
//!
//! Every failure a [`crate::parser::Parser`] can produce is one of the
//! [`ErrorKind`] variants below. [`ErrorKind::is_recoverable`] determines
//! whether an enclosing optional scope (see [`crate::manager`]) may suppress
//! the failure and revert instead of propagating it out of `parse`.

use std::fmt;

/// The category of a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// Read past the end of the input. Recoverable inside an optional scope.
    #[error("read past end of input")]
    NoData,

    /// A spacer's target address is behind the current cursor. Recoverable.
    #[error("spacer target address has already been passed")]
    AddressOverrun,

    /// A `Const` (or `Flag`) predicate rejected its decoded input. Recoverable.
    #[error("decoded value did not match the expected constant")]
    Mismatch,

    /// Negative length, out-of-range index, or similar logic error. Fatal.
    #[error("address or length out of bounds")]
    Bounds,

    /// Wrong input type supplied to a parser constructor. Fatal.
    #[error("wrong input type supplied to a parser constructor")]
    Type,

    /// A [`crate::manager::DataManager`] was misused: child active, used
    /// outside its scope, address mode mismatch on scope exit. Fatal.
    #[error("data manager used incorrectly")]
    State,

    /// An operation that isn't implemented for this input, e.g. a non-unit
    /// slice step. Fatal.
    #[error("operation is not supported")]
    Unsupported,
}

impl ErrorKind {
    /// Whether an enclosing revertible scope may suppress this failure.
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            ErrorKind::NoData | ErrorKind::AddressOverrun | ErrorKind::Mismatch
        )
    }
}

/// Identifies where in the parser tree and input stream a failure occurred.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Site {
    /// The label of the parser that failed, if it had one.
    pub label: Option<String>,
    /// The target address the failing parser was reading towards, if any.
    pub address: Option<u64>,
    /// The absolute bit offset into the source at the point of failure.
    pub position: u64,
}

impl Site {
    /// A site with only a position recorded.
    pub fn at(position: u64) -> Self {
        Site {
            label: None,
            address: None,
            position,
        }
    }

    /// Attaches a label to this site.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attaches a target address to this site.
    pub fn with_address(mut self, address: u64) -> Self {
        self.address = Some(address);
        self
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bit {}", self.position)?;
        if let Some(addr) = self.address {
            write!(f, ", address {:#x}", addr)?;
        }
        if let Some(label) = &self.label {
            write!(f, ", in {:?}", label)?;
        }
        Ok(())
    }
}

/// A parse failure: its category, plus where it happened.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {site}")]
pub struct Error {
    /// The failure category.
    pub kind: ErrorKind,
    /// Where the failure occurred.
    pub site: Site,
}

impl Error {
    /// Constructs an error of the given kind with no site information.
    pub fn new(kind: ErrorKind) -> Self {
        Error {
            kind,
            site: Site::default(),
        }
    }

    /// Constructs an error of the given kind at the given position.
    pub fn at(kind: ErrorKind, position: u64) -> Self {
        Error {
            kind,
            site: Site::at(position),
        }
    }

    /// Attaches site information, replacing whatever was there.
    pub fn with_site(mut self, site: Site) -> Self {
        self.site = site;
        self
    }

    /// Whether an enclosing revertible scope may suppress this failure.
    pub fn is_recoverable(&self) -> bool {
        self.kind.is_recoverable()
    }

    /// Fills in `site` from `label`/`address`/`position` if it is still the
    /// default — used by the parser evaluation loop to tag an error with the
    /// innermost node that saw it, without overwriting a site a nested
    /// parser already attached.
    pub fn annotate_if_empty(mut self, label: Option<&str>, address: Option<u64>, position: u64) -> Self {
        if self.site == Site::default() {
            self.site = Site::at(position);
            if let Some(l) = label {
                self.site = self.site.with_label(l.to_string());
            }
            if let Some(a) = address {
                self.site = self.site.with_address(a);
            }
        }
        self
    }
}

/// The result type used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;
