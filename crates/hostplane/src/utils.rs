use anyhow::anyhow;
use colored::{ColoredString, Colorize};
use hostplane_cloud::{InstanceStatus, Notification, NotificationLevel};
use hostplane_detect::ProviderKind;

/// Parses a provider name, listing the valid ones on error
pub fn parse_provider(name: &str) -> anyhow::Result<ProviderKind> {
    name.parse::<ProviderKind>().map_err(|_| {
        anyhow!(
            "unsupported provider '{}'\nAvailable providers: {}",
            name,
            ProviderKind::ALL
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    })
}

/// Splits `key=value`
pub fn parse_key_value(pair: &str) -> anyhow::Result<(&str, &str)> {
    pair.split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{}'", pair))
}

pub fn colored_status(status: InstanceStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        InstanceStatus::Available => text.green(),
        InstanceStatus::Failed => text.red(),
        InstanceStatus::TimedOut => text.yellow(),
        InstanceStatus::Deleted => text.dimmed(),
        _ => text.cyan(),
    }
}

pub fn print_notification(notification: &Notification) {
    let (icon, title) = match notification.level {
        NotificationLevel::Success => ("✓".green(), notification.title.green()),
        NotificationLevel::Warning => ("⚠".yellow(), notification.title.yellow()),
        NotificationLevel::Danger => ("✗".red(), notification.title.red()),
    };
    println!("{} {}", icon, title.bold());
    println!("  {}", notification.body);
}

/// Table header followed by a rule
pub fn print_header(header: String) {
    let width = header.chars().count();
    println!("{}", header.bold());
    println!("{}", "─".repeat(width).dimmed());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider() {
        assert_eq!(parse_provider("gcp").unwrap(), ProviderKind::Gcp);

        let err = parse_provider("linode").unwrap_err().to_string();
        assert!(err.contains("unsupported provider 'linode'"));
        assert!(err.contains("digitalocean"));
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(parse_key_value("a=b").unwrap(), ("a", "b"));
        assert_eq!(parse_key_value("url = x=y").unwrap(), ("url", "x=y"));
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=value").is_err());
    }
}
