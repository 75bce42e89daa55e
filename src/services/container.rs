//! Service container wiring.

use std::sync::Arc;

use crate::config::Config;
use crate::infra::{Mailer, UnitOfWork};

use super::account_service::{AccountManager, AccountService};
use super::auth_service::{AuthService, Authenticator};
use super::user_service::{UserManager, UserService};

/// All application services behind their trait objects.
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<dyn AuthService>,
    pub accounts: Arc<dyn AccountService>,
    pub users: Arc<dyn UserService>,
}

impl Services {
    /// Wire every service over one store and mailer.
    pub fn new<U: UnitOfWork + 'static>(
        uow: Arc<U>,
        mailer: Arc<dyn Mailer>,
        config: Config,
    ) -> Self {
        Self {
            auth: Arc::new(Authenticator::new(uow.clone(), config.clone())),
            accounts: Arc::new(AccountManager::new(uow.clone(), mailer, config)),
            users: Arc::new(UserManager::new(uow)),
        }
    }
}
