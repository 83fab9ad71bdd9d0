use hl_domain::config::{Config, ConfigError, ConfigSeverity};

/// Validate the config and print a report. Returns `false` when any issue
/// is an error; warnings alone still pass.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();
    let report = render_report(&issues, config_path);
    print!("{report}");
    !issues.iter().any(|i| i.severity == ConfigSeverity::Error)
}

fn render_report(issues: &[ConfigError], config_path: &str) -> String {
    if issues.is_empty() {
        return format!("Config OK ({config_path})\n");
    }

    let errors = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    let warnings = issues.len() - errors;

    let mut out = String::new();
    for issue in issues {
        out.push_str(&format!("{issue}\n"));
    }
    out.push_str(&format!(
        "\n{errors} error(s), {warnings} warning(s) in {config_path}\n"
    ));
    out
}

/// Print the resolved config (defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("serializing config: {e}"))?;
    print!("{rendered}");
    Ok(())
}
