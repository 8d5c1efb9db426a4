pub mod auth;
pub mod clients;
pub mod dashboard;
pub mod project_managers;
pub mod projects;
pub mod teams;
pub mod tools;
pub mod users;
