use dbgrid_core::{ServiceState, StatusReply};

use crate::client::ApiClient;

/// Print the provider health. Returns whether it is healthy.
pub async fn status(client: &ApiClient) -> anyhow::Result<bool> {
    let reply = client.status().await?;
    println!("{}", render(&reply));
    Ok(reply.state == ServiceState::Healthy)
}

fn render(reply: &StatusReply) -> String {
    match (&reply.state, &reply.detail) {
        (ServiceState::Healthy, _) => "✓ healthy".to_string(),
        (ServiceState::Unhealthy, Some(detail)) => format!("✗ unhealthy: {detail}"),
        (ServiceState::Unhealthy, None) => "✗ unhealthy".to_string(),
    }
}
