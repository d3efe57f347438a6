pub mod config;
pub mod rest;
