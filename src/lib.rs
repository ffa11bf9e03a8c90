//! Site photo verification service.
//!
//! Field technicians send checklist photos (equipment labels, compass
//! readings) over WhatsApp. Each photo is checked for sharpness, skew and
//! resends, identifiers are read from it, and the worker's job advances
//! through its required photo types as photos pass.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
