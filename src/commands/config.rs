//! `config`: print the resolved runtime configuration

use crate::config::Settings;

/// Render the effective configuration, secrets masked.
pub fn render(settings: &Settings) -> String {
    let mask = |s: &str| {
        if s.is_empty() {
            "(unset)".to_string()
        } else {
            "********".to_string()
        }
    };
    [
        format!("A4F_POOL={}", settings.pool_path.display()),
        format!("A4F_CACHE={}", settings.pool_cached),
        format!("A4F_LOGLEVEL={}", settings.log_level),
        format!("A4F_SCANCODE={:?}", settings.scancode),
        format!("A4F_PRINTRESULT={}", settings.print_result),
        format!("SPDX_TOOLS_CMD={}", settings.spdx_tools_cmd),
        format!("PACKAGE_ID_EXT={}", settings.package_id_ext),
        format!("FOSSY_SERVER={}", settings.fossy_server),
        format!("FOSSY_USER={}", settings.fossy_user),
        format!("FOSSY_PASSWORD={}", mask(&settings.fossy_password)),
        format!("FOSSY_GROUP_ID={}", settings.fossy_group_id),
        format!(
            "A4F_LOCK_KEY={}",
            settings
                .lock_key
                .as_deref()
                .map(mask)
                .unwrap_or_else(|| "(unset)".to_string())
        ),
        format!(
            "MIRROR_DB={}@{}:{}/{}",
            settings.mirror_db.user,
            settings.mirror_db.host,
            settings.mirror_db.port,
            settings.mirror_db.dbname
        ),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_masked() {
        let settings = Settings::for_tests(std::path::Path::new("/tmp/pool"));
        let rendered = render(&settings);
        assert!(rendered.contains("FOSSY_PASSWORD=********"));
        assert!(!rendered.contains("fossy\nFOSSY_GROUP"));
        assert!(rendered.contains("A4F_POOL=/tmp/pool"));
    }
}
