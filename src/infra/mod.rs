//! Infrastructure layer: persistence, transactions, outbound mail.

pub mod db;
pub mod mailer;
pub mod memory;
pub mod repositories;
pub mod unit_of_work;

pub use mailer::{mailer_from_env, LogMailer, Mailer, SmtpMailer};
pub use memory::MemoryStore;
pub use unit_of_work::{Persistence, TransactionContext, TxStore, UnitOfWork};
