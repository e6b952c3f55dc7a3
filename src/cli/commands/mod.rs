pub mod cloud;
pub mod completions;
pub mod config;
pub mod login;
pub mod logout;
pub mod projects;
pub mod status;
pub mod token;
