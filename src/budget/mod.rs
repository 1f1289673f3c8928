//! Budget Guard (BG).
//!
//! Two-level cap (global and per-provider) over external model spend. Every
//! escalation must be admitted by [`BudgetGuard::check`] before being
//! issued. A single lock around check+record ensures no over-admission
//! under concurrent checks.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderLedger {
    pub limit: f64,
    pub used: f64,
    pub requests: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLedger {
    pub global_limit: f64,
    pub global_used: f64,
    pub per_provider: HashMap<String, ProviderLedger>,
    /// Open-ended, deployment-supplied annotations (e.g. cost-center tags),
    /// per the persisted ledger layout's `metadata` field. The controller
    /// itself never writes to this map.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub reset_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl BudgetLedger {
    fn new(global_limit: f64, per_provider_limits: HashMap<String, f64>) -> Self {
        let now = Utc::now();
        Self {
            global_limit,
            global_used: 0.0,
            per_provider: per_provider_limits
                .into_iter()
                .map(|(provider, limit)| (provider, ProviderLedger { limit, ..Default::default() }))
                .collect(),
            metadata: Map::new(),
            reset_at: next_month_boundary(now),
            last_update: now,
        }
    }
}

fn next_month_boundary(from: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if from.month() == 12 { (from.year() + 1, 1) } else { (from.year(), from.month() + 1) };
    chrono::Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(from)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionResult {
    pub admitted: bool,
    pub global_remaining: f64,
    pub provider_remaining: f64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommended: String,
    pub reason: String,
    pub alternatives: Vec<String>,
}

pub struct BudgetGuard {
    ledger: Mutex<BudgetLedger>,
    path: Option<PathBuf>,
    preference_table: HashMap<String, Vec<String>>,
}

impl BudgetGuard {
    pub fn new(global_limit: f64, per_provider_limits: HashMap<String, f64>) -> Self {
        Self {
            ledger: Mutex::new(BudgetLedger::new(global_limit, per_provider_limits)),
            path: None,
            preference_table: default_preference_table(),
        }
    }

    pub async fn with_persistence(self, path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let loaded: BudgetLedger = serde_json::from_str(&content)?;
            *self.ledger.lock().await = loaded;
        }
        Ok(Self { path: Some(path), ..self })
    }

    async fn persist(&self, ledger: &BudgetLedger) -> anyhow::Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        let content = serde_json::to_string_pretty(ledger)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    fn roll_over_if_needed(ledger: &mut BudgetLedger) {
        let now = Utc::now();
        if now >= ledger.reset_at {
            info!("Budget ledger rolling over month boundary");
            ledger.global_used = 0.0;
            for provider in ledger.per_provider.values_mut() {
                provider.used = 0.0;
                provider.requests = 0;
                provider.tokens_in = 0;
                provider.tokens_out = 0;
            }
            ledger.reset_at = next_month_boundary(now);
            ledger.last_update = now;
        }
    }

    /// Check whether `estimated_cost` against `provider` would cross either
    /// cap. Does not record spend; call [`Self::record`] after the call
    /// actually completes.
    pub async fn check(&self, provider: &str, estimated_cost: f64) -> AdmissionResult {
        let mut ledger = self.ledger.lock().await;
        Self::roll_over_if_needed(&mut ledger);

        let global_remaining = ledger.global_limit - ledger.global_used;
        let provider_limit = ledger.per_provider.get(provider).map(|p| p.limit).unwrap_or(f64::MAX);
        let provider_used = ledger.per_provider.get(provider).map(|p| p.used).unwrap_or(0.0);
        let provider_remaining = provider_limit - provider_used;

        if estimated_cost > global_remaining {
            return AdmissionResult {
                admitted: false,
                global_remaining,
                provider_remaining,
                reason: Some("budget_exceeded".to_string()),
            };
        }
        if estimated_cost > provider_remaining {
            return AdmissionResult {
                admitted: false,
                global_remaining,
                provider_remaining,
                reason: Some("budget_exceeded".to_string()),
            };
        }

        AdmissionResult { admitted: true, global_remaining, provider_remaining, reason: None }
    }

    pub async fn record(&self, provider: &str, actual_cost: f64, tokens_in: Option<u32>, tokens_out: Option<u32>) -> anyhow::Result<()> {
        let mut ledger = self.ledger.lock().await;
        Self::roll_over_if_needed(&mut ledger);

        ledger.global_used += actual_cost;
        let entry = ledger.per_provider.entry(provider.to_string()).or_default();
        entry.used += actual_cost;
        entry.requests += 1;
        entry.tokens_in += tokens_in.unwrap_or(0) as u64;
        entry.tokens_out += tokens_out.unwrap_or(0) as u64;
        ledger.last_update = Utc::now();

        if ledger.global_used > ledger.global_limit {
            warn!("Budget Guard: global spend exceeded limit after record (should never happen if check() gated admission)");
        }

        let snapshot = ledger.clone();
        drop(ledger);
        self.persist(&snapshot).await
    }

    pub async fn status(&self) -> BudgetLedger {
        let mut ledger = self.ledger.lock().await;
        Self::roll_over_if_needed(&mut ledger);
        ledger.clone()
    }

    /// Preferred provider for `task_kind`, filtered by remaining budget;
    /// falls back to the provider with the largest remaining balance.
    pub async fn recommend(&self, task_kind: &str, estimated_cost: f64) -> Recommendation {
        let ledger = self.ledger.lock().await;
        let preferred = self.preference_table.get(task_kind).cloned().unwrap_or_default();

        for candidate in &preferred {
            let limit = ledger.per_provider.get(candidate).map(|p| p.limit).unwrap_or(f64::MAX);
            let used = ledger.per_provider.get(candidate).map(|p| p.used).unwrap_or(0.0);
            if limit - used >= estimated_cost {
                return Recommendation {
                    recommended: candidate.clone(),
                    reason: format!("preferred provider for {task_kind}"),
                    alternatives: preferred.iter().filter(|p| *p != candidate).cloned().collect(),
                };
            }
        }

        let fallback = ledger
            .per_provider
            .iter()
            .max_by(|(_, a), (_, b)| (a.limit - a.used).partial_cmp(&(b.limit - b.used)).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| "none".to_string());

        Recommendation {
            recommended: fallback,
            reason: "largest remaining balance".to_string(),
            alternatives: preferred,
        }
    }
}

fn default_preference_table() -> HashMap<String, Vec<String>> {
    let mut table = HashMap::new();
    table.insert("code".to_string(), vec!["anthropic".to_string(), "openai".to_string()]);
    table.insert("chat".to_string(), vec!["openai".to_string(), "anthropic".to_string()]);
    table.insert("reason".to_string(), vec!["anthropic".to_string()]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn providers(limit: f64) -> HashMap<String, f64> {
        let mut m = HashMap::new();
        m.insert("openai".to_string(), limit);
        m
    }

    #[tokio::test]
    async fn status_snapshot_carries_a_metadata_map() {
        let bg = BudgetGuard::new(10.0, providers(10.0));
        let status = bg.status().await;
        assert!(status.metadata.is_empty());
    }

    #[tokio::test]
    async fn check_denies_when_global_cap_would_be_crossed() {
        let bg = BudgetGuard::new(10.0, providers(100.0));
        bg.record("openai", 9.0, None, None).await.unwrap();
        let result = bg.check("openai", 5.0).await;
        assert!(!result.admitted);
        assert_eq!(result.reason.as_deref(), Some("budget_exceeded"));
    }

    #[tokio::test]
    async fn admitted_call_keeps_sum_of_provider_used_consistent_with_global() {
        let mut limits = HashMap::new();
        limits.insert("openai".to_string(), 50.0);
        limits.insert("anthropic".to_string(), 50.0);
        let bg = BudgetGuard::new(100.0, limits);

        bg.record("openai", 10.0, Some(100), Some(50)).await.unwrap();
        bg.record("anthropic", 20.0, None, None).await.unwrap();

        let status = bg.status().await;
        let sum: f64 = status.per_provider.values().map(|p| p.used).sum();
        assert!((sum - status.global_used).abs() < 1e-9);
    }

    #[tokio::test]
    async fn denied_check_does_not_mutate_ledger() {
        let bg = BudgetGuard::new(10.0, providers(10.0));
        let before = bg.status().await;
        let result = bg.check("openai", 100.0).await;
        assert!(!result.admitted);
        let after = bg.status().await;
        assert_eq!(before.global_used, after.global_used);
    }

    #[tokio::test]
    async fn monthly_reset_zeroes_ledger_and_advances_boundary() {
        let bg = BudgetGuard::new(100.0, providers(100.0));
        bg.record("openai", 50.0, None, None).await.unwrap();
        {
            let mut ledger = bg.ledger.lock().await;
            ledger.reset_at = Utc::now() - chrono::Duration::days(1);
        }
        let result = bg.check("openai", 1.0).await;
        assert!(result.admitted);
        let status = bg.status().await;
        assert_eq!(status.global_used, 0.0);
        assert!(status.reset_at > Utc::now());
    }

    #[tokio::test]
    async fn recommend_skips_exhausted_preferred_provider() {
        let mut limits = HashMap::new();
        limits.insert("anthropic".to_string(), 1.0);
        limits.insert("openai".to_string(), 100.0);
        let bg = BudgetGuard::new(200.0, limits);
        bg.record("anthropic", 1.0, None, None).await.unwrap();

        let rec = bg.recommend("reason", 5.0).await;
        assert_eq!(rec.recommended, "openai");
    }

    #[tokio::test]
    async fn spend_recorded_before_reload_is_visible_after() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("budget.json");

        let bg = BudgetGuard::new(100.0, providers(100.0)).with_persistence(&path).await.unwrap();
        bg.record("openai", 12.5, Some(10), Some(20)).await.unwrap();

        let reloaded = BudgetGuard::new(100.0, providers(100.0)).with_persistence(&path).await.unwrap();
        let status = reloaded.status().await;
        assert_eq!(status.per_provider["openai"].used, 12.5);
    }
}
