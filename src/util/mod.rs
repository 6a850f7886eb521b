//! Internal helpers.

pub(crate) mod fs;
