use crate::context::AppContext;
use crate::utils;
use colored::Colorize;

pub async fn handle(app: &AppContext) -> anyhow::Result<()> {
    println!("{}", "Checking cloud provider authentication...".blue());
    println!();

    utils::print_header(format!(
        "{:<14} {:<24} {:<10} {}",
        "PROVIDER", "NAME", "VERTICAL", "AUTH"
    ));
    for (kind, provider) in app.scaling.iter() {
        let vertical = if provider.supports_vertical_scaling() {
            "yes".green()
        } else {
            "no".dimmed()
        };
        let auth = match provider.check_auth().await {
            Ok(status) if status.authenticated => format!(
                "{} {}",
                "✓".green(),
                status.account_info.unwrap_or_default()
            ),
            Ok(status) => format!("{} {}", "✗".red(), status.error.unwrap_or_default().dimmed()),
            Err(e) => format!("{} {}", "✗".red(), e.to_string().dimmed()),
        };
        println!(
            "{:<14} {:<24} {:<10} {}",
            kind.as_str().cyan(),
            provider.display_name(),
            vertical,
            auth
        );
    }
    Ok(())
}
