//! Test module for nexus-rpc
//!
//! Unit and property-based tests for the router, dispatcher, batching,
//! subscriptions and the client's wire handling.


#[cfg(test)]
pub mod router_tests;



#[cfg(test)]
pub mod subscription_tests;

#[cfg(test)]
pub mod validation_tests;
