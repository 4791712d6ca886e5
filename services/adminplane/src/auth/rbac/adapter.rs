//! Read-only Casbin adapter over the authorization tables.
//!
//! # Purpose and responsibility
//! Projects role ⋈ role_menu ⋈ menu and user_role ⋈ role into a deduplicated
//! [`PolicySet`] and loads it into a Casbin model as `p` and `g` rules.
//!
//! # Where it fits
//! [`PolicyEnforcer`](super::enforcer::PolicyEnforcer) builds one adapter per
//! load, bound to the caller's [`RequestContext`], and hands it to
//! `casbin::Enforcer::new`, which calls [`Adapter::load_policy`].
//!
//! # Key invariants and assumptions
//! - Policy is derived from the tables only. The write half of the adapter API
//!   never touches the store; administrators edit the tables and then reload.
//! - Grants never carry an empty permission, even if the source returns one.
//! - A `Conflict` from the store is retried once; every other error is
//!   returned unchanged, wrapped in a Casbin adapter error.
use crate::context::RequestContext;
use crate::store::{PolicySource, StoreError, StoreResult};
use async_trait::async_trait;
use casbin::error::AdapterError;
use casbin::{Adapter, Filter, Model};
use std::sync::Arc;
use warden_authz::{Assignment, Grant, PolicySet};

pub struct TablePolicyAdapter {
    source: Arc<dyn PolicySource>,
    ctx: RequestContext,
}

impl TablePolicyAdapter {
    pub fn new(source: Arc<dyn PolicySource>, ctx: RequestContext) -> Self {
        Self { source, ctx }
    }

    /// Read both relations, retrying once on a concurrent-modification conflict.
    pub async fn fetch(&self) -> StoreResult<PolicySet> {
        match self.fetch_once().await {
            Err(StoreError::Conflict(reason)) => {
                tracing::debug!(%reason, "policy load hit a concurrent modification, retrying");
                self.fetch_once().await
            }
            result => result,
        }
    }

    async fn fetch_once(&self) -> StoreResult<PolicySet> {
        let grants = self.source.role_grants(&self.ctx).await?;
        let assignments = self.source.user_assignments(&self.ctx).await?;

        let mut set = PolicySet::new();
        let mut skipped = 0usize;
        for row in grants {
            if set
                .insert_grant(Grant::access(row.role_id, row.permission))
                .is_err()
            {
                skipped += 1;
            }
        }
        for (user, role) in assignments {
            set.insert_assignment(Assignment::new(user, role));
        }
        if skipped > 0 {
            tracing::debug!(skipped, "dropped grants with empty permission");
        }
        Ok(set)
    }
}

/// Recover the store error carried by a failed Casbin load.
pub fn store_error(err: casbin::Error) -> StoreError {
    match err {
        casbin::Error::AdapterError(AdapterError(inner)) => match inner.downcast::<StoreError>() {
            Ok(store_err) => *store_err,
            Err(other) => StoreError::Unexpected(anyhow::anyhow!(other.to_string())),
        },
        other => StoreError::Unexpected(anyhow::anyhow!(other.to_string())),
    }
}

#[async_trait]
impl Adapter for TablePolicyAdapter {
    async fn load_policy(&mut self, m: &mut dyn Model) -> casbin::Result<()> {
        let set = self
            .fetch()
            .await
            .map_err(|err| casbin::Error::AdapterError(AdapterError(Box::new(err))))?;
        for line in set.lines() {
            let kind = line.kind().as_str();
            m.add_policy(kind, kind, line.rule());
        }
        Ok(())
    }

    async fn load_filtered_policy<'a>(
        &mut self,
        m: &mut dyn Model,
        _f: Filter<'a>,
    ) -> casbin::Result<()> {
        self.load_policy(m).await
    }

    async fn save_policy(&mut self, _m: &mut dyn Model) -> casbin::Result<()> {
        tracing::debug!("save_policy ignored: policy tables are read-only");
        Ok(())
    }

    async fn clear_policy(&mut self) -> casbin::Result<()> {
        tracing::debug!("clear_policy ignored: policy tables are read-only");
        Ok(())
    }

    fn is_filtered(&self) -> bool {
        false
    }

    async fn add_policy(
        &mut self,
        sec: &str,
        ptype: &str,
        rule: Vec<String>,
    ) -> casbin::Result<bool> {
        tracing::debug!(
            sec,
            ptype,
            rule = %rule.join(", "),
            "add_policy ignored: policy tables are read-only"
        );
        Ok(false)
    }

    async fn add_policies(
        &mut self,
        sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> casbin::Result<bool> {
        tracing::debug!(
            sec,
            ptype,
            rules = rules.len(),
            "add_policies ignored: policy tables are read-only"
        );
        Ok(false)
    }

    async fn remove_policy(
        &mut self,
        sec: &str,
        ptype: &str,
        rule: Vec<String>,
    ) -> casbin::Result<bool> {
        tracing::debug!(
            sec,
            ptype,
            rule = %rule.join(", "),
            "remove_policy ignored: policy tables are read-only"
        );
        Ok(false)
    }

    async fn remove_policies(
        &mut self,
        sec: &str,
        ptype: &str,
        rules: Vec<Vec<String>>,
    ) -> casbin::Result<bool> {
        tracing::debug!(
            sec,
            ptype,
            rules = rules.len(),
            "remove_policies ignored: policy tables are read-only"
        );
        Ok(false)
    }

    async fn remove_filtered_policy(
        &mut self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: Vec<String>,
    ) -> casbin::Result<bool> {
        tracing::debug!(
            sec,
            ptype,
            field_index,
            fields = field_values.len(),
            "remove_filtered_policy ignored: policy tables are read-only"
        );
        Ok(false)
    }
}
