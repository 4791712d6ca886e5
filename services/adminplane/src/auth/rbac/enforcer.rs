//! Casbin policy enforcer with atomic snapshot reload.
//!
//! # Purpose and responsibility
//! Owns the current [`PolicySnapshot`], a Casbin [`Enforcer`] built from
//! [`MODEL_CONF`](super::MODEL_CONF) and loaded through
//! [`TablePolicyAdapter`], and answers `check(user, object, action)` against
//! it. Reloads build a fresh Casbin enforcer and publish it in one swap.
//!
//! # Where it fits
//! Route guards call [`PolicyEnforcer::check`]; the reload endpoint and the
//! optional background poller call [`PolicyEnforcer::reload`].
//!
//! # Key invariants and assumptions
//! - Readers hold the read lock only long enough to clone the `Arc`; a check
//!   never observes a partially loaded Casbin model.
//! - Reloads are serialized; a failed reload leaves the previous snapshot and
//!   state untouched.
//! - An uninitialized enforcer denies everything, and so does a Casbin
//!   evaluation error.
//!
//! # Concurrency
//! The snapshot slot is a `std::sync::RwLock` (never held across `.await`);
//! the reload mutex is a `tokio::sync::Mutex` because the load awaits I/O.
use super::adapter::{TablePolicyAdapter, store_error};
use crate::context::RequestContext;
use crate::store::{PolicySource, StoreError};
use casbin::{CoreApi, Enforcer, MgmtApi, RbacApi};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use warden_authz::{AuthzError, Decision, PolicyKind, PolicyLine, PolicySet, RoleId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnforcerState {
    Uninitialized,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReloadReport {
    pub grants: usize,
    pub assignments: usize,
}

#[derive(Debug, Error)]
pub enum EnforcerError {
    #[error("policy load failed: {0}")]
    PolicyLoad(#[source] StoreError),
    #[error("casbin model rejected: {0}")]
    Model(#[source] casbin::Error),
    #[error("casbin returned an unreadable rule: {0}")]
    Rule(#[source] AuthzError),
}

/// One successfully loaded policy: the Casbin enforcer plus the lines it holds.
pub struct PolicySnapshot {
    casbin: Enforcer,
    policy: PolicySet,
}

impl PolicySnapshot {
    async fn build(adapter: TablePolicyAdapter) -> Result<Self, EnforcerError> {
        let model = warden_authz::casbin_model()
            .await
            .map_err(EnforcerError::Model)?;
        let mut casbin = Enforcer::new(model, adapter)
            .await
            .map_err(|err| EnforcerError::PolicyLoad(store_error(err)))?;
        casbin.enable_auto_save(false);

        let mut lines = Vec::new();
        for rule in casbin.get_policy() {
            lines.push(
                PolicyLine::from_rule(PolicyKind::Policy, &rule).map_err(EnforcerError::Rule)?,
            );
        }
        for rule in casbin.get_grouping_policy() {
            lines.push(
                PolicyLine::from_rule(PolicyKind::Grouping, &rule).map_err(EnforcerError::Rule)?,
            );
        }
        let policy = PolicySet::from_lines(lines).map_err(EnforcerError::Rule)?;
        Ok(Self { casbin, policy })
    }

    pub fn check(&self, user: UserId, object: &str, action: &str) -> Decision {
        match self.casbin.enforce((user.subject(), object, action)) {
            Ok(allowed) => Decision::from(allowed),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    user = %user,
                    object,
                    action,
                    "casbin evaluation failed"
                );
                Decision::Deny
            }
        }
    }

    /// Roles directly assigned to `user`, in ascending order.
    pub fn roles_for_user(&self, user: UserId) -> BTreeSet<RoleId> {
        self.policy
            .assignments()
            .filter(|assignment| assignment.user == user)
            .map(|assignment| assignment.role)
            .collect()
    }

    /// Objects `user` may `action`, in ascending order.
    pub fn permissions_for_user(&self, user: UserId, action: &str) -> BTreeSet<String> {
        self.casbin
            .get_implicit_permissions_for_user(&user.subject(), None)
            .into_iter()
            .filter_map(|rule| match rule.as_slice() {
                [_, object, act] if act == action => Some(object.clone()),
                _ => None,
            })
            .collect()
    }

    /// Canonical listing of every line Casbin holds, one per row.
    pub fn render(&self) -> String {
        self.policy.render()
    }

    pub fn policy_set(&self) -> &PolicySet {
        &self.policy
    }

    pub fn grant_count(&self) -> usize {
        self.policy.grant_count()
    }

    pub fn assignment_count(&self) -> usize {
        self.policy.assignment_count()
    }

    pub fn line_count(&self) -> usize {
        self.grant_count() + self.assignment_count()
    }
}

pub struct PolicyEnforcer {
    source: Arc<dyn PolicySource>,
    snapshot: RwLock<Option<Arc<PolicySnapshot>>>,
    reload_lock: Mutex<()>,
}

impl PolicyEnforcer {
    pub fn uninitialized(source: Arc<dyn PolicySource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(None),
            reload_lock: Mutex::new(()),
        }
    }

    /// Build an enforcer and perform the initial load.
    ///
    /// # Errors
    /// - [`EnforcerError::PolicyLoad`] if the tables cannot be read; callers
    ///   treat this as fatal at boot.
    pub async fn load(
        ctx: &RequestContext,
        source: Arc<dyn PolicySource>,
    ) -> Result<Self, EnforcerError> {
        let enforcer = Self::uninitialized(source);
        enforcer.reload(ctx).await?;
        Ok(enforcer)
    }

    pub fn state(&self) -> EnforcerState {
        match self.snapshot.read() {
            Ok(slot) if slot.is_some() => EnforcerState::Ready,
            _ => EnforcerState::Uninitialized,
        }
    }

    /// Current snapshot, or `None` before the first successful load.
    pub fn snapshot(&self) -> Option<Arc<PolicySnapshot>> {
        self.snapshot.read().ok().and_then(|slot| slot.clone())
    }

    pub fn check(&self, user: UserId, object: &str, action: &str) -> Decision {
        let decision = match self.snapshot() {
            Some(snapshot) => snapshot.check(user, object, action),
            None => Decision::Deny,
        };
        metrics::counter!("warden_authz_decisions_total", "decision" => decision.as_str())
            .increment(1);
        decision
    }

    pub async fn reload(&self, ctx: &RequestContext) -> Result<ReloadReport, EnforcerError> {
        let _guard = self.reload_lock.lock().await;
        let adapter = TablePolicyAdapter::new(self.source.clone(), ctx.clone());
        let snapshot = match PolicySnapshot::build(adapter).await {
            Ok(snapshot) => Arc::new(snapshot),
            Err(err) => {
                tracing::warn!(error = %err, "policy reload failed; keeping previous snapshot");
                metrics::counter!("warden_policy_reloads_total", "outcome" => "failure")
                    .increment(1);
                return Err(err);
            }
        };
        let report = ReloadReport {
            grants: snapshot.grant_count(),
            assignments: snapshot.assignment_count(),
        };
        let lines = snapshot.line_count();
        match self.snapshot.write() {
            Ok(mut slot) => *slot = Some(snapshot),
            Err(poisoned) => *poisoned.into_inner() = Some(snapshot),
        }
        metrics::counter!("warden_policy_reloads_total", "outcome" => "success").increment(1);
        metrics::gauge!("warden_policy_lines").set(lines as f64);
        tracing::info!(
            grants = report.grants,
            assignments = report.assignments,
            "policy snapshot published"
        );
        Ok(report)
    }
}

/// Reload every `interval` until `cancel` fires. Failures are logged by
/// [`PolicyEnforcer::reload`] and the previous snapshot keeps serving.
pub fn spawn_reload_poller(
    enforcer: Arc<PolicyEnforcer>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the boot load already ran.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let ctx = RequestContext::new(cancel.child_token());
                    let _ = enforcer.reload(&ctx).await;
                }
            }
        }
        tracing::debug!("policy reload poller stopped");
    })
}
