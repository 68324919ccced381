// 🔐 Auth gate - who may drive the pipeline

use std::sync::atomic::{AtomicBool, Ordering};

pub trait AuthGate: Send + Sync {
    fn is_authenticated(&self) -> bool;
    fn logout(&self);
}

/// Open while ledger credentials are configured, closed after logout.
#[derive(Debug)]
pub struct CredentialGate {
    has_credentials: bool,
    signed_in: AtomicBool,
}

impl CredentialGate {
    pub fn new(has_credentials: bool) -> Self {
        CredentialGate {
            has_credentials,
            signed_in: AtomicBool::new(has_credentials),
        }
    }

    /// Token values still holding the `.env` template text do not count.
    pub fn from_token(token: &str) -> Self {
        let token = token.trim();
        CredentialGate::new(!token.is_empty() && !token.to_lowercase().starts_with("your"))
    }
}

impl AuthGate for CredentialGate {
    fn is_authenticated(&self) -> bool {
        self.has_credentials && self.signed_in.load(Ordering::SeqCst)
    }

    fn logout(&self) {
        self.signed_in.store(false, Ordering::SeqCst);
    }
}
