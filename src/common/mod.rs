mod fs;
#[cfg(feature = "source")]
mod polygon;

pub(crate) use fs::*;
#[cfg(feature = "source")]
pub(crate) use polygon::*;
