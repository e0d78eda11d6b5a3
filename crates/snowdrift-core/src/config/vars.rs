//! Variable interpolation for config files.
//!
//! Supports the following syntax:
//! - `$VAR` or `${VAR}` - substitute with the provider value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `$$` - escape sequence for literal `$`
//!
//! Values are resolved through a [`ConfigProvider`], so a config file can
//! reference keys that live in the environment or in a secrets file.

use regex::Regex;
use std::sync::LazyLock;

use super::provider::ConfigProvider;

/// Matches `$$`, `${VAR}`, `${VAR:-default}`, `${VAR-default}` and `$VAR`.
static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # Escape sequence $$
        |
        \$\{                           # Opening ${
            ([A-Za-z_][A-Za-z0-9_]*)   # Variable name (capture group 1)
            (?:                        # Optional default value group
                (:?-)                  # :- or just - (capture group 2)
                ([^}]*)                # Default value (capture group 3)
            )?
        \}                             # Closing }
        |
        \$([A-Za-z_][A-Za-z0-9_]*)     # Unbraced $VAR (capture group 4)
        ",
    )
    .expect("Invalid regex pattern")
});

/// Result of variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Any errors encountered during interpolation.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate variables using `provider` for lookups.
///
/// All errors are accumulated so the user can see every missing key at once.
pub fn interpolate_with(input: &str, provider: &dyn ConfigProvider) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            let full_match = &caps[0];

            if full_match == "$$" {
                return "$".to_string();
            }

            let var_name = caps
                .get(1)
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or("");

            let default_syntax = caps.get(2).map(|m| m.as_str());
            let default_value = caps.get(3).map(|m| m.as_str());

            match provider.lookup(var_name) {
                Some(value) => {
                    // Values land inside YAML; a newline could inject extra keys.
                    if value.contains('\n') || value.contains('\r') {
                        errors.push(format!(
                            "variable '{var_name}' contains newlines, which is not allowed"
                        ));
                        return full_match.to_string();
                    }

                    if value.is_empty() && default_syntax == Some(":-") {
                        return default_value.unwrap_or("").to_string();
                    }

                    value
                }
                None => {
                    if let Some(default) = default_value {
                        default.to_string()
                    } else {
                        errors.push(format!(
                            "variable '{var_name}' is not set in {}",
                            provider.describe()
                        ));
                        full_match.to_string()
                    }
                }
            }
        })
        .to_string();

    InterpolationResult { text, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::provider::MapProvider;

    #[test]
    fn test_basic_substitution() {
        let vars = MapProvider::new().with("ROOT", "/data");
        let result = interpolate_with("root: $ROOT", &vars);
        assert!(result.is_ok());
        assert_eq!(result.text, "root: /data");
    }

    #[test]
    fn test_braced_substitution() {
        let vars = MapProvider::new().with("PREFIX", "car_sales_data");
        let result = interpolate_with("prefix: ${PREFIX}_v2", &vars);
        assert!(result.is_ok());
        assert_eq!(result.text, "prefix: car_sales_data_v2");
    }

    #[test]
    fn test_missing_variables_are_all_reported() {
        let vars = MapProvider::new();
        let result = interpolate_with("a: $MISS1, b: ${MISS2}", &vars);
        assert!(!result.is_ok());
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("MISS1"));
        assert!(result.errors[1].contains("MISS2"));
        assert!(result.errors[0].contains("not set"));
    }

    #[test]
    fn test_default_value_unset() {
        let result = interpolate_with("table: ${TABLE:-CAR_SALES}", &MapProvider::new());
        assert!(result.is_ok());
        assert_eq!(result.text, "table: CAR_SALES");
    }

    #[test]
    fn test_default_value_empty_with_colon() {
        let vars = MapProvider::new().with("TABLE", "");
        let result = interpolate_with("table: ${TABLE:-CAR_SALES}", &vars);
        assert_eq!(result.text, "table: CAR_SALES");
    }

    #[test]
    fn test_default_value_empty_without_colon() {
        let vars = MapProvider::new().with("TABLE", "");
        let result = interpolate_with("table: ${TABLE-CAR_SALES}", &vars);
        assert!(result.is_ok());
        assert_eq!(result.text, "table: ");
    }

    #[test]
    fn test_escape_sequence() {
        let result = interpolate_with("price: $$100", &MapProvider::new());
        assert!(result.is_ok());
        assert_eq!(result.text, "price: $100");
    }

    #[test]
    fn test_newline_injection_blocked() {
        let vars = MapProvider::new().with("ROOT", "/data\nsink: {}");
        let result = interpolate_with("root: $ROOT", &vars);
        assert!(!result.is_ok());
        assert!(result.errors[0].contains("newlines"));
    }

    #[test]
    fn test_carriage_return_injection_blocked() {
        let vars = MapProvider::new().with("ROOT", "/data\r");
        let result = interpolate_with("root: $ROOT", &vars);
        assert!(!result.is_ok());
    }

    #[test]
    fn test_yaml_config_example() {
        let vars = MapProvider::new()
            .with("LAKE_BUCKET", "landing")
            .with("AWS_KEY", "AKIA123");
        let yaml = r#"
source:
  root: "s3://${LAKE_BUCKET}/car_sales_data"
  storage_options:
    aws_access_key_id: ${AWS_KEY}
    aws_region: ${AWS_REGION:-us-east-1}
"#;
        let result = interpolate_with(yaml, &vars);
        assert!(result.is_ok());
        assert!(result.text.contains("s3://landing/car_sales_data"));
        assert!(result.text.contains("aws_access_key_id: AKIA123"));
        assert!(result.text.contains("aws_region: us-east-1"));
    }
}
