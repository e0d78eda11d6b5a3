//! YAML configuration file loading.

use std::path::Path;

use serde::de::DeserializeOwned;

use super::provider::ConfigProvider;
use super::vars::interpolate_with;
use crate::error::ConfigError;

/// Check if a path has a YAML extension.
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "yaml" || ext == "yml")
        .unwrap_or(false)
}

/// Read, interpolate and deserialize a YAML config file.
pub fn load_yaml_file<C: DeserializeOwned>(
    path: &Path,
    provider: &dyn ConfigProvider,
) -> Result<C, ConfigError> {
    if !is_yaml_file(path) {
        return Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    parse_yaml(&contents, provider)
}

/// Interpolate and deserialize YAML text.
pub fn parse_yaml<C: DeserializeOwned>(
    contents: &str,
    provider: &dyn ConfigProvider,
) -> Result<C, ConfigError> {
    let result = interpolate_with(contents, provider);
    if !result.is_ok() {
        return Err(ConfigError::EnvInterpolation {
            message: result.errors.join("\n"),
        });
    }

    serde_yaml::from_str(&result.text).map_err(|source| ConfigError::YamlParse { source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapProvider;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Sample {
        root: String,
    }

    #[test]
    fn test_is_yaml_file() {
        assert!(is_yaml_file(Path::new("snowdrift.yaml")));
        assert!(is_yaml_file(Path::new("/etc/snowdrift.yml")));
        assert!(!is_yaml_file(Path::new("snowdrift.toml")));
        assert!(!is_yaml_file(Path::new("snowdrift")));
    }

    #[test]
    fn test_load_yaml_file_interpolates() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(file, "root: ${{LAKE_ROOT}}/car_sales_data").unwrap();

        let vars = MapProvider::new().with("LAKE_ROOT", "/opt/lake");
        let sample: Sample = load_yaml_file(file.path(), &vars).unwrap();
        assert_eq!(sample.root, "/opt/lake/car_sales_data");
    }

    #[test]
    fn test_load_yaml_file_rejects_other_formats() {
        let err = load_yaml_file::<Sample>(Path::new("config.json"), &MapProvider::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_parse_yaml_reports_interpolation_errors() {
        let err = parse_yaml::<Sample>("root: $UNSET_ROOT", &MapProvider::new()).unwrap_err();
        match err {
            ConfigError::EnvInterpolation { message } => assert!(message.contains("UNSET_ROOT")),
            other => panic!("Expected interpolation error, got {other:?}"),
        }
    }
}
