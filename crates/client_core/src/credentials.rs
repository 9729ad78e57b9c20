/// Where the order credential comes from. Having none is a normal state for
/// anonymous browsing; it only matters once an order is submitted.
pub trait CredentialSource: Send + Sync {
    fn credential(&self) -> Option<String>;
}

pub struct NoCredential;

impl CredentialSource for NoCredential {
    fn credential(&self) -> Option<String> {
        None
    }
}

pub struct StaticCredential(String);

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialSource for StaticCredential {
    fn credential(&self) -> Option<String> {
        non_empty(self.0.clone())
    }
}

/// Reads the token from an environment variable on every lookup.
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialSource for EnvCredential {
    fn credential(&self) -> Option<String> {
        std::env::var(&self.var).ok().and_then(non_empty)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
