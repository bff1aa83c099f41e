//! Provider pool management.
//!
//! # Responsibilities
//! - Manage one pool of providers per category
//! - Apply the pool's rotation strategy to eligible members
//! - Record every selection in a bounded rotation history
//! - Serve the admin operations (create, add/remove member, rotate)

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::PoolConfig;
use crate::load_balancer::{Candidate, RotationStrategy, StrategyKind, StrategyOptions};
use crate::registry::{Category, ProviderEntry, ProviderId, ProviderRegistry};

pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("no pool serves category '{0}'")]
    CategoryNotFound(Category),
    #[error("pool '{0}' not found")]
    PoolNotFound(String),
    #[error("pool '{0}' already exists")]
    PoolAlreadyExists(String),
    #[error("category '{category}' is already served by pool '{pool}'")]
    CategoryAlreadyServed { category: Category, pool: String },
    #[error("provider '{0}' is not registered")]
    UnknownProvider(ProviderId),
    #[error("provider '{provider}' serves '{provider_category}', pool serves '{pool_category}'")]
    CategoryMismatch {
        provider: ProviderId,
        provider_category: Category,
        pool_category: Category,
    },
    #[error("provider '{provider}' is already a member of pool '{pool}'")]
    DuplicateMember { pool: String, provider: ProviderId },
    #[error("provider '{provider}' is not a member of pool '{pool}'")]
    MemberNotFound { pool: String, provider: ProviderId },
}

/// A pool member with optional overrides of the descriptor's ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "MemberRepr")]
pub struct PoolMember {
    pub provider: ProviderId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

impl PoolMember {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: ProviderId::new(provider),
            priority: None,
            weight: None,
        }
    }
}

/// Members may be written as a bare id or as a table with overrides.
#[derive(Deserialize)]
#[serde(untagged)]
enum MemberRepr {
    Id(ProviderId),
    Full {
        provider: ProviderId,
        #[serde(default)]
        priority: Option<i32>,
        #[serde(default)]
        weight: Option<u32>,
    },
}

impl From<MemberRepr> for PoolMember {
    fn from(repr: MemberRepr) -> Self {
        match repr {
            MemberRepr::Id(provider) => Self {
                provider,
                priority: None,
                weight: None,
            },
            MemberRepr::Full {
                provider,
                priority,
                weight,
            } => Self {
                provider,
                priority,
                weight,
            },
        }
    }
}

/// One rotation history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationEvent {
    pub provider: ProviderId,
    pub at_unix_ms: u64,
    /// Strategy name for selections, `manual` for admin rotations.
    pub reason: String,
}

/// Serializable view of a pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub id: String,
    pub category: Category,
    pub strategy: StrategyKind,
    pub members: Vec<PoolMember>,
    pub history_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fresh_ttl_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_ttl_secs: Option<u64>,
}

pub struct Pool {
    id: String,
    category: Category,
    strategy: Box<dyn RotationStrategy>,
    members: ArcSwap<Vec<PoolMember>>,
    history: Mutex<VecDeque<RotationEvent>>,
    history_capacity: usize,
    fresh_ttl: Option<Duration>,
    stale_ttl: Option<Duration>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("strategy", &self.strategy.kind())
            .field("members", &self.members.load().len())
            .finish()
    }
}

impl Pool {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn members(&self) -> Arc<Vec<PoolMember>> {
        self.members.load_full()
    }

    pub fn fresh_ttl(&self) -> Option<Duration> {
        self.fresh_ttl
    }

    pub fn stale_ttl(&self) -> Option<Duration> {
        self.stale_ttl
    }

    /// Order the eligible members with the pool's strategy and record the
    /// head in the rotation history.
    pub fn select<F>(&self, registry: &ProviderRegistry, mut eligible: F) -> Vec<Arc<ProviderEntry>>
    where
        F: FnMut(&Arc<ProviderEntry>) -> bool,
    {
        let members = self.members.load();
        let mut entries = HashMap::with_capacity(members.len());
        let mut candidates = Vec::with_capacity(members.len());

        for (position, member) in members.iter().enumerate() {
            let Some(entry) = registry.get(&member.provider) else {
                continue;
            };
            if !eligible(&entry) {
                continue;
            }
            candidates.push(candidate_for(member, position, &entry));
            entries.insert(member.provider.clone(), entry);
        }

        let ordered = self.strategy.order(&candidates, members.len());
        if let Some(head) = ordered.first() {
            self.push_history(head.clone(), self.strategy.kind().as_str());
        }

        ordered
            .into_iter()
            .filter_map(|id| entries.remove(&id))
            .collect()
    }

    /// Manual rotation. Returns the provider now leading.
    pub fn rotate_now(&self, registry: &ProviderRegistry) -> Option<ProviderId> {
        let members = self.members.load();
        let leading = match self.strategy.advance(members.len()) {
            Some(position) => members.get(position).map(|m| m.provider.clone()),
            None => {
                let candidates: Vec<_> = members
                    .iter()
                    .enumerate()
                    .filter_map(|(position, member)| {
                        registry
                            .get(&member.provider)
                            .map(|entry| candidate_for(member, position, &entry))
                    })
                    .collect();
                self.strategy
                    .order(&candidates, members.len())
                    .into_iter()
                    .next()
            }
        };

        if let Some(provider) = &leading {
            self.push_history(provider.clone(), "manual");
            tracing::info!(pool = %self.id, provider = %provider, "Pool rotated manually");
        }
        leading
    }

    /// Most recent entries first.
    pub fn history(&self, limit: usize) -> Vec<RotationEvent> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.iter().rev().take(limit).cloned().collect()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            id: self.id.clone(),
            category: self.category.clone(),
            strategy: self.strategy.kind(),
            members: self.members.load().as_ref().clone(),
            history_len: self
                .history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            fresh_ttl_secs: self.fresh_ttl.map(|d| d.as_secs()),
            stale_ttl_secs: self.stale_ttl.map(|d| d.as_secs()),
        }
    }

    fn push_history(&self, provider: ProviderId, reason: &str) {
        let at_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(RotationEvent {
            provider,
            at_unix_ms,
            reason: reason.to_string(),
        });
    }
}

fn candidate_for(member: &PoolMember, position: usize, entry: &ProviderEntry) -> Candidate {
    let descriptor = entry.descriptor();
    let (consecutive_failures, avg_latency, total_requests) = entry.with_state(|s| {
        (
            s.circuit.consecutive_failures,
            s.usage.avg_latency,
            s.usage.total_requests,
        )
    });
    Candidate {
        id: member.provider.clone(),
        position,
        priority: member.priority.unwrap_or(descriptor.priority),
        weight: member.weight.unwrap_or(descriptor.weight),
        consecutive_failures,
        avg_latency,
        total_requests,
    }
}

/// Defaults applied to pools that don't override them.
#[derive(Debug, Clone, Copy)]
pub struct PoolDefaults {
    pub history_capacity: usize,
    pub slow_latency_threshold: Duration,
}

impl Default for PoolDefaults {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            slow_latency_threshold: StrategyOptions::default().slow_latency_threshold,
        }
    }
}

/// Manages all pools; one pool per category.
pub struct PoolManager {
    registry: Arc<ProviderRegistry>,
    pools: DashMap<String, Arc<Pool>>,
    by_category: DashMap<Category, String>,
    defaults: PoolDefaults,
    /// Serializes admin mutations so validation and the swap are atomic.
    admin: Mutex<()>,
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("pools", &self.pools.len())
            .finish_non_exhaustive()
    }
}

impl PoolManager {
    pub fn new(registry: Arc<ProviderRegistry>, defaults: PoolDefaults) -> Self {
        Self {
            registry,
            pools: DashMap::new(),
            by_category: DashMap::new(),
            defaults,
            admin: Mutex::new(()),
        }
    }

    pub fn create_pool(&self, config: &PoolConfig) -> Result<PoolSnapshot, PoolError> {
        let _guard = self.admin.lock().unwrap_or_else(PoisonError::into_inner);

        if self.pools.contains_key(&config.id) {
            return Err(PoolError::PoolAlreadyExists(config.id.clone()));
        }
        if let Some(pool) = self.by_category.get(&config.category) {
            return Err(PoolError::CategoryAlreadyServed {
                category: config.category.clone(),
                pool: pool.value().clone(),
            });
        }

        let mut members: Vec<PoolMember> = Vec::with_capacity(config.members.len());
        for member in &config.members {
            self.check_member(&config.id, &config.category, &members, &member.provider)?;
            members.push(member.clone());
        }

        let options = StrategyOptions {
            seed: config.seed,
            slow_latency_threshold: config
                .slow_latency_threshold_ms
                .map(Duration::from_millis)
                .unwrap_or(self.defaults.slow_latency_threshold),
        };
        let pool = Arc::new(Pool {
            id: config.id.clone(),
            category: config.category.clone(),
            strategy: config.strategy.build(&options),
            members: ArcSwap::from_pointee(members),
            history: Mutex::new(VecDeque::new()),
            history_capacity: self.defaults.history_capacity.max(1),
            fresh_ttl: config.fresh_ttl_secs.map(Duration::from_secs),
            stale_ttl: config.stale_ttl_secs.map(Duration::from_secs),
        });

        tracing::info!(
            pool = %pool.id,
            category = %pool.category,
            strategy = %pool.strategy(),
            members = pool.members.load().len(),
            "Pool created"
        );

        let snapshot = pool.snapshot();
        self.by_category
            .insert(config.category.clone(), config.id.clone());
        self.pools.insert(config.id.clone(), pool);
        Ok(snapshot)
    }

    pub fn pool(&self, id: &str) -> Result<Arc<Pool>, PoolError> {
        self.pools
            .get(id)
            .map(|pool| pool.value().clone())
            .ok_or_else(|| PoolError::PoolNotFound(id.to_string()))
    }

    pub fn pool_for(&self, category: &Category) -> Result<Arc<Pool>, PoolError> {
        let id = self
            .by_category
            .get(category)
            .map(|id| id.value().clone())
            .ok_or_else(|| PoolError::CategoryNotFound(category.clone()))?;
        self.pool(&id)
    }

    /// Ordered eligible candidates for a category.
    pub fn candidates<F>(
        &self,
        category: &Category,
        eligible: F,
    ) -> Result<(Arc<Pool>, Vec<Arc<ProviderEntry>>), PoolError>
    where
        F: FnMut(&Arc<ProviderEntry>) -> bool,
    {
        let pool = self.pool_for(category)?;
        let ordered = pool.select(&self.registry, eligible);
        Ok((pool, ordered))
    }

    pub fn add_member(&self, pool_id: &str, member: PoolMember) -> Result<PoolSnapshot, PoolError> {
        let _guard = self.admin.lock().unwrap_or_else(PoisonError::into_inner);
        let pool = self.pool(pool_id)?;

        let current = pool.members.load_full();
        self.check_member(&pool.id, &pool.category, &current, &member.provider)?;

        let mut next = current.as_ref().clone();
        tracing::info!(pool = %pool.id, provider = %member.provider, "Pool member added");
        next.push(member);
        pool.members.store(Arc::new(next));
        Ok(pool.snapshot())
    }

    pub fn remove_member(&self, pool_id: &str, provider: &ProviderId) -> Result<PoolSnapshot, PoolError> {
        let _guard = self.admin.lock().unwrap_or_else(PoisonError::into_inner);
        let pool = self.pool(pool_id)?;

        let current = pool.members.load_full();
        if !current.iter().any(|m| &m.provider == provider) {
            return Err(PoolError::MemberNotFound {
                pool: pool.id.clone(),
                provider: provider.clone(),
            });
        }

        let next: Vec<_> = current
            .iter()
            .filter(|m| &m.provider != provider)
            .cloned()
            .collect();
        pool.members.store(Arc::new(next));
        tracing::info!(pool = %pool.id, provider = %provider, "Pool member removed");
        Ok(pool.snapshot())
    }

    pub fn rotate_now(&self, pool_id: &str) -> Result<Option<ProviderId>, PoolError> {
        let pool = self.pool(pool_id)?;
        Ok(pool.rotate_now(&self.registry))
    }

    pub fn rotation_history(&self, pool_id: &str, limit: usize) -> Result<Vec<RotationEvent>, PoolError> {
        Ok(self.pool(pool_id)?.history(limit))
    }

    pub fn pools(&self) -> Vec<PoolSnapshot> {
        let mut pools: Vec<_> = self.pools.iter().map(|p| p.value().snapshot()).collect();
        pools.sort_by(|a, b| a.id.cmp(&b.id));
        pools
    }

    fn check_member(
        &self,
        pool_id: &str,
        pool_category: &Category,
        existing: &[PoolMember],
        provider: &ProviderId,
    ) -> Result<(), PoolError> {
        let entry = self
            .registry
            .get(provider)
            .ok_or_else(|| PoolError::UnknownProvider(provider.clone()))?;
        let provider_category = &entry.descriptor().category;
        if provider_category != pool_category {
            return Err(PoolError::CategoryMismatch {
                provider: provider.clone(),
                provider_category: provider_category.clone(),
                pool_category: pool_category.clone(),
            });
        }
        if existing.iter().any(|m| &m.provider == provider) {
            return Err(PoolError::DuplicateMember {
                pool: pool_id.to_string(),
                provider: provider.clone(),
            });
        }
        Ok(())
    }
}
