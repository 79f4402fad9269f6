//! Row-level security resolution.
//!
//! REGULAR filters are opt-in: holding a linked role applies the clause, and
//! downstream combines them with OR inside a group. BASE filters are opt-out:
//! they apply unless the principal holds a linked role.

use std::collections::HashSet;

use palisade_catalog::{Datasource, RowLevelSecurityFilter};
use palisade_types::{RlsFilterId, RlsFilterType, RoleId};

use crate::error::Result;
use crate::evaluator::AccessEvaluator;
use crate::principal::GuestTokenRlsRule;

impl AccessEvaluator<'_> {
    /// Filters that apply to `table` for this principal, ordered by id.
    pub fn effective_filters(&self, table: &Datasource) -> Result<Vec<RowLevelSecurityFilter>> {
        let held: HashSet<RoleId> = self.user_roles()?.iter().map(|r| r.id).collect();

        let mut filters: Vec<RowLevelSecurityFilter> = self
            .catalog()
            .rls_filters_for_table(table.id)?
            .into_iter()
            .filter(|f| {
                let linked = f.role_ids.iter().any(|id| held.contains(id));
                match f.filter_type {
                    RlsFilterType::Regular => linked,
                    RlsFilterType::Base => !linked,
                }
            })
            .collect();
        filters.sort_by_key(|f| f.id);
        Ok(filters)
    }

    /// Ids of the effective filters, ascending.
    pub fn rls_ids(&self, table: &Datasource) -> Result<Vec<RlsFilterId>> {
        let mut ids: Vec<RlsFilterId> = self
            .effective_filters(table)?
            .into_iter()
            .map(|f| f.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Guest-token rules scoped to `dataset` or to every dataset.
    ///
    /// Empty unless the principal is a guest.
    pub fn guest_rls_filters(&self, dataset: &Datasource) -> Vec<GuestTokenRlsRule> {
        match self.guest() {
            Some(guest) => guest
                .rls
                .iter()
                .filter(|rule| rule.applies_to(&dataset.id))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn guest_rls_filter_clauses(&self, dataset: &Datasource) -> Vec<String> {
        self.guest_rls_filters(dataset)
            .into_iter()
            .map(|rule| rule.clause)
            .collect()
    }

    /// Cache-partitioning key for results read through `datasource`.
    ///
    /// Guest clauses first, then the stringified filter ids. Filter ids only
    /// contribute when the datasource supports row-level security.
    pub fn rls_cache_key(&self, datasource: &Datasource) -> Result<Vec<String>> {
        let mut key = self.guest_rls_filter_clauses(datasource);
        if datasource.is_rls_supported {
            key.extend(self.rls_ids(datasource)?.iter().map(ToString::to_string));
        }
        Ok(key)
    }
}
