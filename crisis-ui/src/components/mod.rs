pub mod auth;
pub mod bob;
pub mod dashboard;
pub mod reference;
