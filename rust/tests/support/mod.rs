#![allow(dead_code)]

mod helpers;

pub use helpers::*;
