use crate::context::AppContext;
use crate::utils;
use colored::Colorize;

pub async fn show(app: &AppContext) -> anyhow::Result<()> {
    let settings = app.settings_store().load().await?;

    if settings.is_empty() {
        println!("{}", "No saved settings".dimmed());
        println!("Run {} to record the detected environment", "hostplane settings save".cyan());
        return Ok(());
    }

    utils::print_header(format!(
        "{:<24} {:<16} {:<8} {:<9} {}",
        "KEY", "VALUE", "TYPE", "EDITABLE", "DESCRIPTION"
    ));
    for (key, setting) in settings.iter() {
        let editable = if setting.is_editable { "yes".green() } else { "no".dimmed() };
        let setting_type = serde_json::to_value(setting.setting_type)?;
        println!(
            "{:<24} {:<16} {:<8} {:<9} {}",
            key.cyan(),
            setting.value,
            setting_type.as_str().unwrap_or_default(),
            editable,
            setting.description.dimmed()
        );
    }
    Ok(())
}

/// Persists a fresh detection snapshot plus user overrides
pub async fn save(app: &AppContext, overrides: &[String]) -> anyhow::Result<()> {
    let store = app.settings_store();
    let mut settings = store.load().await?;

    let info = app.deployment.get().await;
    settings.record_deployment(&info);
    for pair in overrides {
        let (key, value) = utils::parse_key_value(pair)?;
        settings.set(key, value)?;
    }

    store.save(&settings).await?;
    // The next reader re-detects instead of reusing this process's snapshot
    app.deployment.forget().await;

    println!("{}", "✓ Settings saved".green());
    println!("  Deployment mode: {}", info.mode.to_string().cyan());
    println!("  Cloud provider:  {}", info.cloud_provider.to_string().cyan());
    if !overrides.is_empty() {
        println!("  Overrides:       {}", overrides.len());
    }
    Ok(())
}
