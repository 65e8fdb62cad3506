#![deny(clippy::unwrap_used)]

pub mod relay;
