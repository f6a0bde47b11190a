use crate::context::AppContext;
use crate::utils;
use anyhow::anyhow;
use colored::Colorize;

pub async fn handle(app: &AppContext, provider: &str) -> anyhow::Result<()> {
    let kind = utils::parse_provider(provider)?;
    let adapter = app
        .scaling
        .get_provider_by_kind(kind)
        .ok_or_else(|| anyhow!("no scaling adapter for {}", kind))?;

    println!("Updating kubeconfig for {}...", adapter.display_name().cyan());
    adapter.update_kubeconfig().await?;
    println!("{}", "✓ Kubeconfig updated".green());
    Ok(())
}
