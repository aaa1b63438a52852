pub mod market;
pub mod tracking;
