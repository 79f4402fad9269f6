//! The security manager: one handle over the catalog, the evaluator, the
//! role synchronizer and the guest token service.

use std::sync::Arc;

use palisade_catalog::{
    Catalog, Dashboard, Datasource, PermissionModel, RowLevelSecurityFilter, Store, StoreError,
};
use palisade_config::PalisadeConfig;
use palisade_guest::{
    Audience, Clock, GuestRequest, GuestTokenConfig, GuestTokenService, validate_resources,
};
use palisade_rbac::{
    AccessEvaluator, AccessSettings, AccessTarget, GuestTokenResource, GuestTokenRlsRule,
    GuestTokenUser, Principal, RoleSynchronizer, SqlParserExtractor, SyncReport, TableExtractor,
};
use palisade_types::{DashboardId, UserId};
use tracing::{debug, info};

use crate::error::Result;
use crate::settings;

/// Secret used when a manager is built without configuration.
const DEFAULT_GUEST_SECRET: &str = "test-guest-secret-change-me";

/// Entry point for access control over a [`Store`].
///
/// Cheap to share behind an `Arc`; every check opens its own read view.
pub struct SecurityManager<S> {
    store: S,
    settings: AccessSettings,
    synchronizer: RoleSynchronizer,
    guest_tokens: GuestTokenService,
    extractor: Arc<dyn TableExtractor>,
}

impl<S: Store> SecurityManager<S> {
    /// A manager with default settings.
    pub fn new(store: S) -> Self {
        Self {
            store,
            settings: AccessSettings::default(),
            synchronizer: RoleSynchronizer::new(),
            guest_tokens: GuestTokenService::new(GuestTokenConfig::new(DEFAULT_GUEST_SECRET)),
            extractor: Arc::new(SqlParserExtractor),
        }
    }

    /// A manager configured from a loaded [`PalisadeConfig`].
    pub fn from_config(store: S, config: &PalisadeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            settings: settings::access_settings(config),
            synchronizer: settings::role_synchronizer(config),
            guest_tokens: GuestTokenService::new(settings::guest_token_config(config)?),
            extractor: Arc::new(SqlParserExtractor),
        })
    }

    #[must_use]
    pub fn with_settings(mut self, settings: AccessSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_synchronizer(mut self, synchronizer: RoleSynchronizer) -> Self {
        self.synchronizer = synchronizer;
        self
    }

    /// Replaces the guest token settings. A clock or audience set earlier is kept.
    #[must_use]
    pub fn with_guest_token_config(mut self, config: GuestTokenConfig) -> Self {
        self.guest_tokens = self.guest_tokens.with_config(config);
        self
    }

    /// Replaces the time source used for guest token issuance and expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.guest_tokens = self.guest_tokens.with_clock(clock);
        self
    }

    /// Overrides the guest token audience.
    #[must_use]
    pub fn with_audience(mut self, audience: Audience) -> Self {
        self.guest_tokens = self.guest_tokens.with_audience(audience);
        self
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn TableExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &AccessSettings {
        &self.settings
    }

    pub fn guest_tokens(&self) -> &GuestTokenService {
        &self.guest_tokens
    }

    // ------------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------------

    /// Recomputes every built-in role from the current permission universe.
    pub fn sync_role_definitions(&self) -> Result<SyncReport> {
        let report = self.synchronizer.sync(&self.store)?;
        info!(
            roles = report.roles.len(),
            created = report.missing_perms_created,
            deleted = report.faulty_pvms_deleted,
            "Role definitions synchronized"
        );
        Ok(report)
    }

    pub fn copy_role(&self, from: &str, to: &str, merge: bool) -> Result<()> {
        Ok(self.synchronizer.copy_role(&self.store, from, to, merge)?)
    }

    /// Deletes pairs missing their permission or resource.
    pub fn clean_faulty_pvms(&self) -> Result<usize> {
        Ok(self
            .store
            .transaction(|tx| -> palisade_catalog::Result<usize> { tx.clean_faulty_pvms() })?)
    }

    pub fn create_missing_perms(&self) -> Result<usize> {
        Ok(self
            .store
            .transaction(|tx| -> palisade_catalog::Result<usize> { tx.create_missing_perms() })?)
    }

    // ------------------------------------------------------------------------
    // Principals
    // ------------------------------------------------------------------------

    /// The persisted user `id` with its current roles.
    pub fn load_user(&self, id: UserId) -> Result<Principal> {
        let user = self
            .store
            .read(|c| c.user(id))?
            .ok_or_else(|| StoreError::NotFound {
                kind: "user",
                key: id.to_string(),
            })?;
        debug!(user = %id, roles = user.role_ids.len(), "Loaded user");
        Ok(Principal::user(user.id, user.role_ids))
    }

    /// A guest principal from the request's guest token, if embedding is on
    /// and the token is valid.
    pub fn request_loader(&self, request: &dyn GuestRequest) -> Result<Option<Principal>> {
        if !self.settings.embedded {
            return Ok(None);
        }
        let role_id = self.store.read(|c| self.guest_tokens.guest_role_id(c))?;
        Ok(self
            .guest_tokens
            .resolve_from_request(request, role_id)
            .map(Principal::Guest))
    }

    /// Validates the resource grants against the catalog, then signs a token.
    pub fn create_guest_token(
        &self,
        user: GuestTokenUser,
        resources: Vec<GuestTokenResource>,
        rls_rules: Vec<GuestTokenRlsRule>,
        host: Option<&str>,
    ) -> Result<String> {
        self.store.read(|c| validate_resources(c, &resources))?;
        Ok(self.guest_tokens.issue(user, resources, rls_rules, host)?)
    }

    // ------------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------------

    fn evaluator<'a>(
        &'a self,
        catalog: &'a dyn Catalog,
        principal: &'a Principal,
    ) -> AccessEvaluator<'a> {
        AccessEvaluator::new(catalog, principal, &self.settings)
            .with_extractor(self.extractor.as_ref())
    }

    /// Runs `f` against an evaluator for `principal` over a consistent read view.
    pub fn with_evaluator<T>(
        &self,
        principal: &Principal,
        f: impl FnOnce(&AccessEvaluator<'_>) -> palisade_rbac::Result<T>,
    ) -> Result<T> {
        Ok(self.store.read(|catalog| -> palisade_rbac::Result<T> {
            f(&self.evaluator(catalog, principal))
        })?)
    }

    pub fn raise_for_access(&self, principal: &Principal, target: AccessTarget<'_>) -> Result<()> {
        self.with_evaluator(principal, |ev| ev.raise_for_access(target))
    }

    /// Fails with a dashboard denial unless `principal` may view the dashboard.
    pub fn can_access_dashboard(
        &self,
        principal: &Principal,
        id: DashboardId,
    ) -> Result<Dashboard> {
        Ok(self.store.read(|catalog| -> palisade_rbac::Result<Dashboard> {
            let dashboard = catalog.dashboard(id)?.ok_or_else(|| StoreError::NotFound {
                kind: "dashboard",
                key: id.to_string(),
            })?;
            self.evaluator(catalog, principal).can_access_dashboard(&dashboard)?;
            Ok(dashboard)
        })?)
    }

    pub fn raise_for_user_activity_access(
        &self,
        principal: &Principal,
        user_id: UserId,
    ) -> Result<()> {
        self.with_evaluator(principal, |ev| ev.raise_for_user_activity_access(user_id))
    }

    pub fn effective_filters(
        &self,
        principal: &Principal,
        table: &Datasource,
    ) -> Result<Vec<RowLevelSecurityFilter>> {
        self.with_evaluator(principal, |ev| ev.effective_filters(table))
    }

    pub fn rls_cache_key(
        &self,
        principal: &Principal,
        datasource: &Datasource,
    ) -> Result<Vec<String>> {
        self.with_evaluator(principal, |ev| ev.rls_cache_key(datasource))
    }
}
