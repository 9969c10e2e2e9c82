pub mod auth;
pub mod db;
pub mod grading;
pub mod guard;
pub mod header;
pub mod ledger;
pub mod navigation;
pub mod quiz;
pub mod session;
pub mod stats;
pub mod timer;
pub mod users;
pub mod view;
