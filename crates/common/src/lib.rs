pub mod id;
pub mod retry;
pub mod time;
