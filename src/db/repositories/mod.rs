pub mod chat_repository;
pub mod poll_repository;
pub mod user_repository;
pub mod vote_repository;
