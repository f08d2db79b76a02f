//! Optional adapter capabilities and their negotiation.
//!
//! A guest requests capabilities as a bit set. The host supports every
//! capability, so negotiation never restricts anything: outside a transaction
//! it is a pure pass-through, and inside a transaction it additionally records
//! the requested set on the [`Transaction`](crate::Transaction).

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A set of optional adapter capabilities, encoded as bit flags.
///
/// The bit assignments are part of the guest-facing ABI and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Features(u64);

impl Features {
    /// The empty set.
    pub const NONE: Features = Features(0);

    /// The request body is buffered in memory, so the guest may read it and
    /// still have it forwarded down the handler chain.
    pub const BUFFER_REQUEST: Features = Features(1);

    /// The response is captured by a buffering writer, so the guest may
    /// rewrite status, headers and body after the handler chain has produced
    /// a response.
    pub const BUFFER_RESPONSE: Features = Features(1 << 1);

    /// Trailer fields may be read and written through the header namespace.
    pub const TRAILERS: Features = Features(1 << 2);

    /// Negotiation at init scope, before any transaction exists.
    ///
    /// The host supports the full capability set, so there is nothing to
    /// restrict: the requested set is returned unchanged.
    pub const fn negotiate(requested: Features) -> Features {
        requested
    }

    /// Returns true if every capability in `other` is enabled in `self`.
    pub const fn contains(self, other: Features) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn from_bits(bits: u64) -> Features {
        Features(bits)
    }
}

impl BitOr for Features {
    type Output = Features;

    fn bitor(self, rhs: Features) -> Features {
        Features(self.0 | rhs.0)
    }
}

impl BitOrAssign for Features {
    fn bitor_assign(&mut self, rhs: Features) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in [
            (Features::BUFFER_REQUEST, "buffer-request"),
            (Features::BUFFER_RESPONSE, "buffer-response"),
            (Features::TRAILERS, "trailers"),
        ] {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}
