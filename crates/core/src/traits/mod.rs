pub mod broker;
pub mod mailer;
pub mod queue;
pub mod repository;
pub mod store;

pub use broker::RelayBroker;
pub use mailer::Mailer;
pub use queue::DispatchQueue;
pub use repository::Repository;
pub use store::BatchStore;
