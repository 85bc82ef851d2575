use std::collections::BTreeSet;

/// Last line of defence before a package name reaches the device shell.
#[derive(Debug, Clone, Default)]
pub struct SafetyGuard {
    blocklist: BTreeSet<String>,
}

impl SafetyGuard {
    pub fn new(blocklist: BTreeSet<String>) -> Self {
        Self { blocklist }
    }

    /// Reduce `com.app:remote` to `com.app` and vet it. On success returns
    /// the package to stop.
    pub fn check<'a>(&self, name: &'a str) -> Result<&'a str, String> {
        let package = name.trim().split(':').next().unwrap_or_default();
        if package.is_empty() {
            return Err("empty package name".to_string());
        }
        if !is_shell_safe(package) {
            return Err(format!("`{package}` is not a valid package name"));
        }
        if self.blocklist.contains(package) {
            return Err(format!("`{package}` is protected"));
        }
        Ok(package)
    }
}

/// Package names only ever use these characters, which also keeps the
/// batched shell line free of metacharacters.
fn is_shell_safe(package: &str) -> bool {
    package
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}
