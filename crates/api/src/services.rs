//! Wiring of stores, managers and the facade.

use std::io::{self, Write};
use std::sync::Arc;

use tracing::{info, warn};

use warden_auth::{Argon2Hasher, PasswordHasher};
use warden_core::{AppResult, Clock, RequestContext, SystemClock};
use warden_infra::{
    Bootstrapped, CredentialStore, InMemoryCredentialStore, Repositories, SystemAdminSeed, TenantProvisioningSaga,
    TokenLifecycleManager, UserDirectory, seed_system_tenant,
};

use crate::config::ServiceConfig;
use crate::facade::AuthorizationFacade;
use crate::rpc::RpcDispatcher;

/// Backends the service runs on. Swapped out wholesale in tests.
pub struct Backends {
    pub credentials: Arc<dyn CredentialStore>,
    pub repos: Repositories,
    pub clock: Arc<dyn Clock>,
    pub hasher: Arc<dyn PasswordHasher>,
}

impl Backends {
    pub fn in_memory(clock: Arc<dyn Clock>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self {
            credentials: Arc::new(InMemoryCredentialStore::with_clock(clock.clone())),
            repos: Repositories::in_memory(),
            clock,
            hasher,
        }
    }
}

pub struct Services {
    pub facade: Arc<AuthorizationFacade>,
    pub dispatcher: RpcDispatcher,
    pub bootstrap: Bootstrapped,
}

impl Services {
    /// Hand a generated administrator password to the operator on `out`.
    /// The log only records that one was generated.
    pub fn announce_generated_password(&self, email: &str, mut out: impl Write) -> io::Result<()> {
        let Some(password) = &self.bootstrap.generated_password else {
            return Ok(());
        };
        warn!(email = %email, "system administrator password was generated; change it after first login");
        writeln!(out, "generated password for system administrator {email}: {password}")?;
        out.flush()
    }
}

/// Seed the system tenant and assemble the facade on top of `backends`.
pub fn assemble(ctx: &RequestContext, config: &ServiceConfig, backends: Backends) -> AppResult<Services> {
    let Backends {
        credentials,
        repos,
        clock,
        hasher,
    } = backends;

    let users = Arc::new(UserDirectory::new(&repos, hasher, config.password_policy, clock.clone()));
    let saga = TenantProvisioningSaga::new(repos.clone(), users.clone(), clock.clone());
    let bootstrap = seed_system_tenant(
        ctx,
        &repos,
        &saga,
        SystemAdminSeed {
            email: config.system_admin_email.clone(),
            password: config.system_admin_password.clone(),
        },
    )?;
    let tokens = Arc::new(TokenLifecycleManager::new(credentials, clock.clone(), config.tokens.clone()));
    let facade = Arc::new(AuthorizationFacade::new(
        &repos,
        tokens,
        users,
        saga,
        clock,
        bootstrap.identity,
    ));
    info!(system_tenant = %bootstrap.identity.tenant_id(), "services ready");

    Ok(Services {
        dispatcher: RpcDispatcher::new(facade.clone()),
        facade,
        bootstrap,
    })
}

/// Production wiring: Redis when configured, otherwise in-memory stores.
pub fn build_services(ctx: &RequestContext, config: &ServiceConfig) -> anyhow::Result<Services> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut backends = Backends::in_memory(clock, Arc::new(Argon2Hasher::new()));
    if let Some(url) = &config.redis_url {
        backends.credentials = redis_store(url)?;
    }
    Ok(assemble(ctx, config, backends)?)
}

#[cfg(feature = "redis")]
fn redis_store(url: &str) -> anyhow::Result<Arc<dyn CredentialStore>> {
    let store = warden_infra::credential_store::RedisCredentialStore::new(url)?;
    info!("using redis credential store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
fn redis_store(_url: &str) -> anyhow::Result<Arc<dyn CredentialStore>> {
    anyhow::bail!("WARDEN_REDIS_URL is set but this build has no redis support (enable the `redis` feature)")
}
