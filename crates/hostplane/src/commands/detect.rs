use crate::context::AppContext;
use colored::Colorize;
use hostplane_detect::DeploymentInfo;

pub async fn handle(app: &AppContext, json: bool, refresh: bool) -> anyhow::Result<()> {
    let info = if refresh {
        let info = app.deployment.refresh().await;
        let store = app.settings_store();
        let mut settings = store.load().await?;
        settings.record_deployment(&info);
        store.save(&settings).await?;
        info
    } else {
        app.deployment.get().await
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    print_info(&info);
    if refresh {
        println!();
        println!("{}", "✓ Saved detection snapshot".green());
    }
    Ok(())
}

fn print_info(info: &DeploymentInfo) {
    let yes_no = |flag: bool| if flag { "yes".green() } else { "no".dimmed() };

    println!("{}", "Deployment".bold());
    println!("  Mode:           {}", info.mode.to_string().cyan());
    println!("  Cloud provider: {}", info.cloud_provider.to_string().cyan());
    println!("  Kubernetes:     {}", yes_no(info.is_kubernetes));
    println!("  Docker:         {}", yes_no(info.is_docker));
    println!("  Standalone:     {}", yes_no(info.is_standalone));
    println!("  Auto-scaling:   {}", yes_no(info.supports_auto_scaling));

    if !info.supports_auto_scaling {
        println!();
        println!(
            "  {}",
            "Auto-scaling needs Kubernetes on a supported cloud provider".dimmed()
        );
    }
}
