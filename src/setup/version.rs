//! Config version stamping.
//!
//! The first line of the config file records which release wrote it.

use anyhow::anyhow;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// What setup has to do for an existing or missing config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupStatus {
    Missing,
    /// Written by an older release; holds the recorded version, or a note for unversioned files
    Outdated(String),
    Current,
}

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
struct SemanticVersion {
    major: u32,
    minor: u32,
    patch: u32,
}

impl SemanticVersion {
    fn parse(version_str: &str) -> anyhow::Result<Self> {
        let parts: Vec<&str> = version_str.trim().split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(anyhow!(
                "Invalid version format: '{}'. Expected 'major.minor.patch'",
                version_str
            ));
        };
        let number = |part: &str| {
            part.parse::<u32>()
                .map_err(|_| anyhow!("Invalid version component '{}' in '{}'", part, version_str))
        };

        Ok(SemanticVersion {
            major: number(*major)?,
            minor: number(*minor)?,
            patch: number(*patch)?,
        })
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Version recorded on the first line, `config_version = "X.Y.Z"`.
fn read_config_version(content: &str) -> anyhow::Result<Option<String>> {
    let Some(first_line) = content.lines().next() else {
        return Ok(None);
    };
    let regex = Regex::new(r#"^[ \t]*config_version[ \t]*=[ \t]*"([^"]+)""#)?;
    Ok(regex.captures(first_line).map(|caps| caps[1].to_string()))
}

pub fn check_setup_needed(config_path: &Path) -> anyhow::Result<SetupStatus> {
    if !config_path.exists() {
        return Ok(SetupStatus::Missing);
    }
    let content = std::fs::read_to_string(config_path)?;
    status_for(&content, CURRENT_VERSION)
}

fn status_for(content: &str, current: &str) -> anyhow::Result<SetupStatus> {
    let Some(config_version) = read_config_version(content)? else {
        return Ok(SetupStatus::Outdated("unknown (legacy config)".to_string()));
    };

    let config_parsed = SemanticVersion::parse(&config_version)?;
    let current_parsed = SemanticVersion::parse(current)?;
    match config_parsed.cmp(&current_parsed) {
        Ordering::Less => Ok(SetupStatus::Outdated(config_version)),
        Ordering::Equal => Ok(SetupStatus::Current),
        Ordering::Greater => {
            tracing::warn!(
                "Config version {} is newer than app version {}",
                config_parsed,
                current_parsed
            );
            Ok(SetupStatus::Current)
        }
    }
}

/// Replaces any `config_version` line with the current one, as the first line.
pub fn update_config_version(config_path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(config_path)?;
    std::fs::write(config_path, restamp(&content, CURRENT_VERSION))?;
    Ok(())
}

fn restamp(content: &str, version: &str) -> String {
    let lines: Vec<&str> = content
        .lines()
        .filter(|line| !line.trim().starts_with("config_version"))
        .collect();

    let version_line = format!(r#"config_version = "{}""#, version);
    if lines.is_empty() {
        format!("{version_line}\n")
    } else {
        format!("{}\n{}\n", version_line, lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semantic_version_parse() {
        let v = SemanticVersion::parse("0.2.5").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (0, 2, 5));
        assert!(SemanticVersion::parse("0.0").is_err());
        assert!(SemanticVersion::parse("0.0.5.1").is_err());
        assert!(SemanticVersion::parse("0.x.1").is_err());
    }

    #[test]
    fn test_status_for() {
        assert_eq!(
            status_for("config_version = \"0.1.0\"\n", "0.1.0").unwrap(),
            SetupStatus::Current
        );
        assert_eq!(
            status_for("config_version = \"0.0.9\"\n", "0.1.0").unwrap(),
            SetupStatus::Outdated("0.0.9".to_string())
        );
        assert_eq!(
            status_for("config_version = \"0.2.0\"\n", "0.1.0").unwrap(),
            SetupStatus::Current
        );
        assert!(matches!(
            status_for("# config_version = \"0.1.0\"\n[audio]\n", "0.1.0").unwrap(),
            SetupStatus::Outdated(_)
        ));
    }

    #[test]
    fn test_restamp_keeps_settings() {
        let updated = restamp(
            "config_version = \"0.0.1\"\n[audio]\ndevice = \"2\"\n",
            "0.1.0",
        );
        assert_eq!(updated, "config_version = \"0.1.0\"\n[audio]\ndevice = \"2\"\n");

        let legacy = restamp("[upload]\nsite_url = \"https://x.org\"", "0.1.0");
        assert!(legacy.starts_with("config_version = \"0.1.0\"\n[upload]"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("composer-audio.toml");
        assert_eq!(check_setup_needed(&path).unwrap(), SetupStatus::Missing);
    }
}
