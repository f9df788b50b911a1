//! Startup profile seeding.
//!
//! The first ADMIN cannot be created through the API, so deployments list
//! their staff in a JSON file referenced by `SEED_PROFILES`:
//!
//! ```json
//! [{ "user_id": "…", "email": "ops@example.com", "full_name": "Ops", "role": "ADMIN", "status": "ACTIVE" }]
//! ```

use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use formadesk_auth::{ProfileStatus, Role};
use formadesk_core::UserId;
use formadesk_infra::Workflow;

#[derive(Debug, Clone, Deserialize)]
pub struct SeedProfile {
    pub user_id: UserId,
    pub email: String,
    /// Defaults to the email when omitted.
    #[serde(default)]
    pub full_name: Option<String>,
    pub role: String,
    #[serde(default = "default_status")]
    pub status: String,
}

impl SeedProfile {
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => &self.email,
        }
    }
}

fn default_status() -> String {
    ProfileStatus::Active.to_string()
}

pub fn parse_seed_profiles(raw: &str) -> anyhow::Result<Vec<SeedProfile>> {
    serde_json::from_str(raw).context("seed profiles must be a JSON array")
}

pub async fn load_seed_profiles(path: &Path) -> anyhow::Result<Vec<SeedProfile>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    parse_seed_profiles(&raw)
}

/// Register every seed profile not already present.
pub async fn apply_seed_profiles(workflow: &Workflow, seeds: &[SeedProfile]) -> anyhow::Result<usize> {
    let now = Utc::now();
    for seed in seeds {
        let role: Role = seed.role.parse()?;
        let status: ProfileStatus = seed.status.parse()?;
        workflow
            .bootstrap_profile(seed.user_id, &seed.email, seed.display_name(), role, status, now)
            .await
            .with_context(|| format!("seeding profile {}", seed.user_id))?;
        info!(user_id = %seed.user_id, role = %role, "seed profile ready");
    }
    Ok(seeds.len())
}
