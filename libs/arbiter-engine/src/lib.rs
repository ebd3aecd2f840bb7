//! Arbiter judging engine
//!
//! Runs untrusted solutions for a named function against test cases, one
//! killable child process per test case, and classifies the results.

pub mod adapter;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod monitor;
pub mod normalizer;
pub mod protocol;


pub use error::JudgeError;
pub use executor::{ExecutionBackend, Judge, ProcessBackend};
