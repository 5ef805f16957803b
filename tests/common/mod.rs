//! Common test utilities for mint-reports integration tests

#[allow(dead_code)]
pub mod assertions;
#[allow(dead_code)]
pub mod upstream;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use upstream::*;
