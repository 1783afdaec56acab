//! `dbgrid tunables` — read and edit the cluster tunables.
//!
//! Edits are a read-modify-write against the API: read `{data, version}`,
//! apply the changes locally, submit them on top of the version read. A
//! concurrent writer makes the submit fail with a conflict, in which case
//! the whole cycle is repeated up to `retries` times.

use anyhow::{Context, bail};
use dbgrid_core::{ProviderError, Tunables, UpdateTunablesRequest};
use dbgrid_tunables::TunableChanges;
use tracing::debug;

use crate::client::ApiClient;

/// Selects which provider and resource the tunables belong to.
#[derive(Debug, Clone)]
pub struct Target {
    pub provider: String,
    pub resource: String,
}

pub async fn list(client: &ApiClient, target: &Target) -> anyhow::Result<Vec<String>> {
    let tunables = client.get_tunables(&target.provider, &target.resource).await?;
    Ok(render_list(&tunables))
}

pub async fn get(client: &ApiClient, target: &Target, key: &str) -> anyhow::Result<String> {
    let tunables = client.get_tunables(&target.provider, &target.resource).await?;
    match tunables.data.get(key) {
        Some(value) => Ok(value.clone()),
        None => bail!("tunable {key:?} is not set"),
    }
}

pub async fn set(
    client: &ApiClient,
    target: &Target,
    assignments: &[String],
    retries: u32,
) -> anyhow::Result<Tunables> {
    let changes = TunableChanges::from_assignments(assignments)?;
    edit(client, target, &changes, retries).await
}

pub async fn unset(
    client: &ApiClient,
    target: &Target,
    keys: &[String],
    retries: u32,
) -> anyhow::Result<Tunables> {
    let changes = TunableChanges::from_removals(keys)?;
    edit(client, target, &changes, retries).await
}

async fn edit(
    client: &ApiClient,
    target: &Target,
    changes: &TunableChanges,
    retries: u32,
) -> anyhow::Result<Tunables> {
    let attempts = retries.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let current = client.get_tunables(&target.provider, &target.resource).await?;
        let req = UpdateTunablesRequest {
            provider: target.provider.clone(),
            resource: target.resource.clone(),
            data: changes.apply(&current.data),
            version: current.version,
        };
        match client.update_tunables(&req).await {
            Ok(updated) => return Ok(updated),
            Err(ProviderError::Conflict(msg)) if attempt < attempts => {
                debug!(attempt, version = current.version, %msg, "tunables changed underneath us, retrying");
            }
            Err(err) => {
                return Err(err).with_context(|| format!("updating tunables after {attempt} attempt(s)"));
            }
        }
    }
}

pub fn render_list(tunables: &Tunables) -> Vec<String> {
    let mut lines = vec![format!("version {}", tunables.version)];
    lines.extend(tunables.data.iter().map(|(k, v)| format!("{k}={v}")));
    lines
}
