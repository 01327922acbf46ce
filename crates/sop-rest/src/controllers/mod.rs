//! HTTP controllers.

pub mod health_controller;
pub mod values_controller;
