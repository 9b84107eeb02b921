//! End-to-end tests over the knowledge service.

mod ranking;
mod scenarios;
