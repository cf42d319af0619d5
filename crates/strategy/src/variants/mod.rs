//! Concrete strategies. Each one is a pure policy over the indicator library
//! plus a stable name.

mod support_resistance;
mod volume;

pub use support_resistance::{SupportResistanceDivergenceStrategy, SupportResistanceStrategy};
pub use volume::{VolumeBreakoutStrategy, VolumeEmaStrategy};

use common::{Error, Result};

/// Reject a parameter that no amount of market data could make usable.
pub(crate) fn ensure(ok: bool, message: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidArgument(message.into()))
    }
}
