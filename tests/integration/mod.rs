//! Cross-module lifecycle tests: leaf tasks driven through a real queue with
//! conditions, observers, exclusivity, and cancellation in play together.

mod fixtures;
mod geocode_e2e;
mod lifecycle;
