pub mod book;
pub mod message;
pub mod mode;
pub mod moderation;
pub mod session;
pub mod topic;
