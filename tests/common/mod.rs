#![allow(dead_code)]

pub mod consumers;
pub mod strategies;

pub use consumers::*;
pub use strategies::*;
