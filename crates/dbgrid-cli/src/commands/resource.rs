use dbgrid_core::ProvisionReply;

use crate::client::ApiClient;

pub async fn provision(client: &ApiClient) -> anyhow::Result<()> {
    let reply = client.provision().await?;
    for line in render_provision(&reply) {
        println!("{line}");
    }
    Ok(())
}

pub async fn deprovision(client: &ApiClient, id: &str) -> anyhow::Result<()> {
    client.deprovision(id).await?;
    println!("✓ Deprovisioned {id}");
    Ok(())
}

fn render_provision(reply: &ProvisionReply) -> Vec<String> {
    let mut lines = vec![format!("✓ Provisioned {}", reply.id)];
    lines.extend(reply.env.iter().map(|(k, v)| format!("  {k}={v}")));
    lines
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn provision_output_lists_env_sorted() {
        let reply = ProvisionReply {
            id: "/databases/a:b".to_string(),
            env: BTreeMap::from([
                ("PGUSER".to_string(), "a".to_string()),
                ("DATABASE_URL".to_string(), "postgres://a:p@h:5432/b".to_string()),
            ]),
        };
        let lines = render_provision(&reply);
        assert_eq!(lines[0], "✓ Provisioned /databases/a:b");
        assert_eq!(lines[1], "  DATABASE_URL=postgres://a:p@h:5432/b");
        assert_eq!(lines[2], "  PGUSER=a");
    }
}
