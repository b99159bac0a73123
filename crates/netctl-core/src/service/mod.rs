//! Network action service
//!
//! The facade used by the API/CLI layer. It is responsible for:
//! - Gating requests by source address through the admin rule sets
//! - Routing provider tests and invocations to the [`ProviderRegistry`]
//! - Routing wakes to the [`WolDispatcher`]
//! - Validating admin writes before they reach the record stores
//!
//! ## Request flow
//!
//! ```text
//!  ActionRequest
//!       │
//!       ▼
//!  ┌──────────┐  Deny   ┌──────────────┐
//!  │  gate    │───────▶ │ AccessDenied │
//!  └──────────┘         └──────────────┘
//!       │ Admitted
//!       ▼
//!  ┌──────────────────┬───────────────────┬──────────────────┐
//!  │ check_access     │ ProviderRegistry  │ WolDispatcher    │
//!  │ (AccessPolicy)   │ (test / invoke)   │ (wake)           │
//!  └──────────────────┴───────────────────┴──────────────────┘
//!       │
//!       ▼
//!  Completed(ActionOutcome) | Failed(Error)
//! ```
//!
//! Each request is a single attempt. Retrying a transient failure is up to
//! the caller.

use crate::acl::{AccessPolicy, Verdict, parse_source};
use crate::config::{AccessRuleSet, ProviderAccount, ProviderAccountView, ServiceConfig, WolTarget};
use crate::error::{Error, Result};
use crate::registry::ProviderRegistry;
use crate::store::MemoryRecordStore;
use crate::traits::{InvokeOutcome, Probe, Record, RecordStore};
use crate::wol::{WakeReport, WolDispatcher};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a connectivity test
pub type ConnectivityResult = Result<Probe>;

/// Actions the service can perform
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Evaluate a rule set for an address
    CheckAccess {
        /// Rule set id
        rule_set_id: String,
        /// Address to evaluate
        address: String,
    },
    /// Probe a provider account
    TestProvider {
        /// Account id
        account_id: String,
    },
    /// Invoke a provider action
    InvokeProvider {
        /// Account id
        account_id: String,
        /// Action name
        action: String,
        /// Action payload
        payload: serde_json::Value,
    },
    /// Send a magic packet to a stored target
    Wake {
        /// Target id
        target_id: String,
    },
    /// List provider accounts with secrets masked
    ListAccounts,
}

impl Action {
    /// Short action name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Action::CheckAccess { .. } => "check_access",
            Action::TestProvider { .. } => "test_provider",
            Action::InvokeProvider { .. } => "invoke_provider",
            Action::Wake { .. } => "wake",
            Action::ListAccounts => "list_accounts",
        }
    }
}

/// An inbound request
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    /// Source address of the caller
    pub source: String,
    /// Requested action
    pub action: Action,
}

impl ActionRequest {
    /// Create a new request
    pub fn new(source: impl Into<String>, action: Action) -> Self {
        Self {
            source: source.into(),
            action,
        }
    }
}

/// Result of a completed request
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Verdict of an access check
    Access(Verdict),
    /// Successful connectivity test
    Connectivity(Probe),
    /// Successful invocation
    Invoked(InvokeOutcome),
    /// Packet handed to the network stack
    Woken(WakeReport),
    /// Masked provider accounts
    Accounts(Vec<ProviderAccountView>),
}

/// Record stores used by the service
#[derive(Clone)]
pub struct ServiceStores {
    /// Access rule sets
    pub rule_sets: Arc<dyn RecordStore<AccessRuleSet>>,
    /// Provider accounts
    pub accounts: Arc<dyn RecordStore<ProviderAccount>>,
    /// Wake-on-LAN targets
    pub targets: Arc<dyn RecordStore<WolTarget>>,
}

impl ServiceStores {
    /// In-memory stores seeded with records
    pub fn memory(
        rule_sets: Vec<AccessRuleSet>,
        accounts: Vec<ProviderAccount>,
        targets: Vec<WolTarget>,
    ) -> Self {
        Self {
            rule_sets: Arc::new(MemoryRecordStore::with_records(rule_sets)),
            accounts: Arc::new(MemoryRecordStore::with_records(accounts)),
            targets: Arc::new(MemoryRecordStore::with_records(targets)),
        }
    }
}

/// Facade composing access control, provider calls and Wake-on-LAN
///
/// The service holds no mutable state of its own; it can be shared behind
/// an `Arc` and called from any number of tasks at once.
pub struct NetworkActionService {
    stores: ServiceStores,
    registry: ProviderRegistry,
    dispatcher: WolDispatcher,
    config: ServiceConfig,
}

impl NetworkActionService {
    /// Create a new service
    ///
    /// The provider registry is created empty with the configured call
    /// bound; provider crates register into [`Self::registry`].
    pub fn new(stores: ServiceStores, config: ServiceConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            stores,
            registry: ProviderRegistry::with_timeout(config.probe_timeout()),
            dispatcher: WolDispatcher::new(config.wake_timeout()),
            config,
        })
    }

    /// Provider registry, for adapter registration
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Service configuration
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Gated entry point
    // -----------------------------------------------------------------------

    /// Gate a request by its source, then perform it
    pub async fn handle(&self, request: ActionRequest) -> Result<ActionOutcome> {
        let action = request.action.name();
        debug!("Received {} from {}", action, request.source);

        if let Err(e) = self.gate(&request.source).await {
            warn!("{} from {} rejected: {}", action, request.source, e);
            return Err(e);
        }

        let result = match request.action {
            Action::CheckAccess {
                rule_set_id,
                address,
            } => self
                .check_access(&rule_set_id, &address)
                .await
                .map(ActionOutcome::Access),
            Action::TestProvider { account_id } => self
                .test_provider(&account_id)
                .await
                .map(ActionOutcome::Connectivity),
            Action::InvokeProvider {
                account_id,
                action,
                payload,
            } => self
                .invoke_provider(&account_id, &action, &payload)
                .await
                .map(ActionOutcome::Invoked),
            Action::Wake { target_id } => self.wake(&target_id).await.map(ActionOutcome::Woken),
            Action::ListAccounts => self
                .list_provider_account_views()
                .await
                .map(ActionOutcome::Accounts),
        };

        match &result {
            Ok(_) => info!("{} from {} completed", action, request.source),
            Err(e) => warn!("{} from {} failed: {}", action, request.source, e),
        }
        result
    }

    /// Check the source against every admin rule set
    async fn gate(&self, source: &str) -> Result<()> {
        let source = parse_source(source)?;
        for id in &self.config.admin_rule_sets {
            // A gate rule set that vanished from the store fails closed
            let rule_set = self.load(&self.stores.rule_sets, id).await?;
            let policy = AccessPolicy::from_rule_set(&rule_set)?;
            if policy.evaluate_addr(&source) == Verdict::Deny {
                return Err(Error::AccessDenied {
                    rule_set: id.clone(),
                });
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Caller-facing operations
    // -----------------------------------------------------------------------

    /// Evaluate a stored rule set for a source address
    pub async fn check_access(&self, rule_set_id: &str, source: &str) -> Result<Verdict> {
        let rule_set = self.load(&self.stores.rule_sets, rule_set_id).await?;
        let verdict = AccessPolicy::from_rule_set(&rule_set)?.evaluate(source)?;
        debug!("Rule set {} -> {:?} for {}", rule_set_id, verdict, source);
        Ok(verdict)
    }

    /// Probe a stored provider account
    pub async fn test_provider(&self, account_id: &str) -> ConnectivityResult {
        let account = self.load(&self.stores.accounts, account_id).await?;
        let probe = self.registry.test_connection(&account).await?;
        info!(
            "Provider account {} ({}) reachable in {:?}",
            account.id, account.kind, probe.latency
        );
        Ok(probe)
    }

    /// Invoke an action on a stored provider account
    pub async fn invoke_provider(
        &self,
        account_id: &str,
        action: &str,
        payload: &serde_json::Value,
    ) -> Result<InvokeOutcome> {
        let account = self.load(&self.stores.accounts, account_id).await?;
        self.registry.invoke(&account, action, payload).await
    }

    /// Send a magic packet to a stored target
    ///
    /// Success means the packet left the socket, not that the device woke.
    pub async fn wake(&self, target_id: &str) -> Result<WakeReport> {
        let target = self.load(&self.stores.targets, target_id).await?;
        self.dispatcher.wake_target(&target).await
    }

    // -----------------------------------------------------------------------
    // Admin pass-through with write-time validation
    // -----------------------------------------------------------------------

    /// Validate and store a rule set (create or replace)
    pub async fn save_rule_set(&self, rule_set: AccessRuleSet) -> Result<()> {
        rule_set.validate()?;
        self.stores.rule_sets.upsert(rule_set).await
    }

    /// Delete a rule set
    pub async fn delete_rule_set(&self, id: &str) -> Result<()> {
        self.stores.rule_sets.delete(id).await
    }

    /// Validate and store a provider account (create or replace)
    ///
    /// Secret fields submitted blank or still masked keep their stored
    /// value. Returns the masked view of the stored account.
    pub async fn save_provider_account(
        &self,
        mut account: ProviderAccount,
    ) -> Result<ProviderAccountView> {
        if let Some(stored) = self.stores.accounts.get(&account.id).await?
            && stored.kind == account.kind
        {
            account
                .credentials
                .retain_secrets_from(&stored.credentials, account.kind.secret_fields());
        }

        self.registry.validate(&account)?;
        let view = account.view();
        self.stores.accounts.upsert(account).await?;
        Ok(view)
    }

    /// Delete a provider account
    ///
    /// Adapters hold nothing per account, so there is nothing to invalidate.
    pub async fn delete_provider_account(&self, id: &str) -> Result<()> {
        self.stores.accounts.delete(id).await
    }

    /// Masked view of one provider account
    pub async fn provider_account_view(&self, id: &str) -> Result<ProviderAccountView> {
        Ok(self.load(&self.stores.accounts, id).await?.view())
    }

    /// Masked views of all provider accounts
    pub async fn list_provider_account_views(&self) -> Result<Vec<ProviderAccountView>> {
        Ok(self
            .stores
            .accounts
            .list()
            .await?
            .iter()
            .map(ProviderAccount::view)
            .collect())
    }

    /// Validate and store a Wake-on-LAN target (create or replace)
    pub async fn save_wol_target(&self, target: WolTarget) -> Result<()> {
        target.validate()?;
        self.stores.targets.upsert(target).await
    }

    /// Delete a Wake-on-LAN target
    pub async fn delete_wol_target(&self, id: &str) -> Result<()> {
        self.stores.targets.delete(id).await
    }

    async fn load<R: Record>(&self, store: &Arc<dyn RecordStore<R>>, id: &str) -> Result<R> {
        store
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("{} '{}'", R::KIND, id)))
    }
}
