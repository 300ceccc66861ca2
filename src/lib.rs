pub mod arp;
pub mod config;
pub mod logging;
pub mod store;
pub mod web;
pub mod wol;
