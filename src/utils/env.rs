/// Get environment variable with BREAKWATER_ prefix, falling back to the
/// unprefixed version
///
/// Checks `BREAKWATER_{key}` first, then `{key}`, for compatibility with
/// standard environment variable naming.
///
/// # Examples
///
/// ```rust
/// use breakwater::utils::get_env_with_prefix;
///
/// // Checks BREAKWATER_LOG_LEVEL first, then LOG_LEVEL
/// let level = get_env_with_prefix("LOG_LEVEL");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("BREAKWATER_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}
