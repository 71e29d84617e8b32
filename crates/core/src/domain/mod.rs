pub mod category;
pub mod conversation;
pub mod query;
pub mod response;
pub mod support;
