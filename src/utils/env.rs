/// Get environment variable with MEALPLAN_ prefix, falling back to unprefixed version
///
/// Checks `MEALPLAN_{key}` first, then `{key}`, so hosted platforms that inject
/// plain names (e.g. `STRIPE_SECRET_KEY`) keep working.
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("MEALPLAN_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Read a comma-separated list, dropping blank entries.
pub fn get_env_list(key: &str) -> Option<Vec<String>> {
    get_env_with_prefix(key).map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_with_prefix() {
        unsafe {
            std::env::set_var("MEALPLAN_ENV_TEST_VAR", "prefixed_value");
        }
        assert_eq!(get_env_with_prefix("ENV_TEST_VAR"), Some("prefixed_value".to_string()));
        unsafe {
            std::env::remove_var("MEALPLAN_ENV_TEST_VAR");
        }

        unsafe {
            std::env::set_var("ENV_FALLBACK_VAR", "unprefixed_value");
        }
        assert_eq!(get_env_with_prefix("ENV_FALLBACK_VAR"), Some("unprefixed_value".to_string()));
        unsafe {
            std::env::remove_var("ENV_FALLBACK_VAR");
        }

        assert_eq!(get_env_with_prefix("ENV_NON_EXISTENT_VAR"), None);
    }

    #[test]
    fn test_get_env_list() {
        unsafe {
            std::env::set_var("MEALPLAN_ENV_LIST_VAR", " a@example.com, ,b@example.com ");
        }
        assert_eq!(
            get_env_list("ENV_LIST_VAR"),
            Some(vec!["a@example.com".to_string(), "b@example.com".to_string()])
        );
        unsafe {
            std::env::remove_var("MEALPLAN_ENV_LIST_VAR");
        }
    }
}
