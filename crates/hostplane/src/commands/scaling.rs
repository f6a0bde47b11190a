use crate::context::AppContext;
use crate::utils;
use anyhow::bail;
use colored::Colorize;
use hostplane_cloud::{
    HorizontalScaling, HorizontalToggle, ScalingForm, ScalingOrchestrator, ScalingTarget,
    UpdateMode, VerticalScaling, VerticalToggle,
};

/// Turns the `scaling apply` flags into a form
///
/// Range checks are left to the orchestrator so that they are reported per
/// action like any other provider error.
pub fn build_form(
    horizontal: Option<(u32, u32, u8)>,
    disable_hpa: bool,
    vpa_mode: Option<&str>,
    disable_vpa: bool,
    replicas: Option<u32>,
) -> anyhow::Result<ScalingForm> {
    let horizontal = match (horizontal, disable_hpa) {
        (Some((min, max, cpu)), _) => Some(HorizontalToggle::Enable(HorizontalScaling::new(
            min, max, cpu,
        ))),
        (None, true) => Some(HorizontalToggle::Disable),
        (None, false) => None,
    };

    let vertical = match (vpa_mode, disable_vpa) {
        (Some(mode), _) => Some(VerticalToggle::Enable(VerticalScaling {
            update_mode: mode.parse::<UpdateMode>()?,
        })),
        (None, true) => Some(VerticalToggle::Disable),
        (None, false) => None,
    };

    let form = ScalingForm {
        horizontal,
        vertical,
        replicas,
    };
    if form.is_empty() {
        bail!(
            "nothing to apply\n  Use --min/--max/--cpu, --disable-hpa, --vpa-mode, --disable-vpa or --replicas"
        );
    }
    Ok(form)
}

pub async fn show(app: &AppContext, target: &ScalingTarget, json: bool) -> anyhow::Result<()> {
    let info = app.deployment.get().await;
    let status = ScalingOrchestrator::new(&app.scaling, info)
        .status(target)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{} {}", "Workload".bold(), target.to_string().cyan());
    println!("  Provider:  {}", status.provider.as_str().cyan());
    println!("  Replicas:  {}", status.replicas);

    match &status.config.horizontal {
        Some(hpa) => println!(
            "  HPA:       {}-{} replicas at {}% CPU",
            hpa.min_replicas, hpa.max_replicas, hpa.target_cpu_percent
        ),
        None => println!("  HPA:       {}", "not configured".dimmed()),
    }

    if !status.supports_vertical_scaling {
        println!("  VPA:       {}", "not supported on this provider".dimmed());
    } else {
        match &status.config.vertical {
            Some(vpa) => println!("  VPA:       {} mode", vpa.update_mode),
            None => println!("  VPA:       {}", "not configured".dimmed()),
        }
    }
    Ok(())
}

pub async fn apply(
    app: &AppContext,
    target: &ScalingTarget,
    form: &ScalingForm,
) -> anyhow::Result<()> {
    let info = app.deployment.get().await;
    println!("Applying scaling changes to {}...", target.to_string().cyan());
    println!();

    let result = ScalingOrchestrator::new(&app.scaling, info)
        .apply(target, form)
        .await;

    for notification in result.notifications() {
        utils::print_notification(&notification);
    }
    println!();
    println!("{}", format!("Finished in {}ms", result.duration_ms).dimmed());

    if !result.is_success() {
        let total = result.failed.len() + result.succeeded.len();
        bail!("{} of {} scaling changes failed", result.failed.len(), total);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_hpa() {
        let form = build_form(Some((2, 10, 70)), false, None, false, None).unwrap();
        assert_eq!(
            form.horizontal,
            Some(HorizontalToggle::Enable(HorizontalScaling::new(2, 10, 70)))
        );
        assert!(form.vertical.is_none());
        assert!(form.replicas.is_none());
    }

    #[test]
    fn test_disable_both() {
        let form = build_form(None, true, None, true, None).unwrap();
        assert_eq!(form.horizontal, Some(HorizontalToggle::Disable));
        assert_eq!(form.vertical, Some(VerticalToggle::Disable));
    }

    #[test]
    fn test_vpa_mode() {
        let form = build_form(None, false, Some("recreate"), false, Some(3)).unwrap();
        assert_eq!(
            form.vertical,
            Some(VerticalToggle::Enable(VerticalScaling {
                update_mode: UpdateMode::Recreate
            }))
        );
        assert_eq!(form.replicas, Some(3));
    }

    #[test]
    fn test_unknown_vpa_mode() {
        let err = build_form(None, false, Some("sometimes"), false, None).unwrap_err();
        assert!(err.to_string().contains("unknown update mode"));
    }

    #[test]
    fn test_empty_form_rejected() {
        let err = build_form(None, false, None, false, None).unwrap_err();
        assert!(err.to_string().contains("nothing to apply"));
    }

    #[test]
    fn test_out_of_range_passes_through() {
        // Validation happens in the orchestrator
        let form = build_form(Some((5, 2, 70)), false, None, false, None).unwrap();
        assert!(form.horizontal.is_some());
    }
}
