//! Domain ports (interfaces) for the scheduler's storage seam.

pub mod bot_repository;
pub mod request_repository;
pub mod result_repository;
pub mod to_run_repository;
pub mod transactional_store;

pub use bot_repository::BotRepository;
pub use request_repository::RequestRepository;
pub use result_repository::{ResultFilter, ResultRepository};
pub use to_run_repository::{Candidate, ToRunRepository};
pub use transactional_store::TransactionalStore;
