// src/lib.rs

//! Portwatch: marine-weather bulletin fetching and port risk classification

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod test_support;
