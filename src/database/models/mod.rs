pub mod client;
pub mod otp_code;
pub mod project;
pub mod project_manager;
pub mod team;
pub mod tool;
pub mod user;

pub use client::Client;
pub use otp_code::OtpCode;
pub use project::{Project, ProjectProgress, PROJECT_STATUSES};
pub use project_manager::ProjectManager;
pub use team::{Team, TeamSummary};
pub use tool::{DevelopmentTool, TestingTool};
pub use user::{User, ROLES};
