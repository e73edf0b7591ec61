pub(crate) mod apportion;
pub(crate) mod circle;
pub(crate) mod repair;
