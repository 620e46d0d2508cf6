//! Real-estate listing service: listing CRUD, filtered search, buyer
//! interest tracking and paid premium upgrades.

pub mod auth;
pub mod controllers;
pub mod error;
pub mod filter;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod payments;
pub mod premium;
pub mod settings;
pub mod state;
pub mod store;
