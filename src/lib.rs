pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod normalization;

#[cfg(test)]
mod phi_audit; // Static scan keeping lab values out of logs
