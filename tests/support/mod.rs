#![allow(dead_code)]

pub mod containers;
pub mod synthetic;
