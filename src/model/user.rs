use serde::{Deserialize, Serialize};

/// A configured user and the set of ledger addresses they own. Mutable
/// in storage; read-only from the core's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: String,
    pub wallets: Vec<String>,
}

impl UserConfig {
    pub fn owns(&self, address: &str) -> bool {
        self.wallets.iter().any(|w| w == address)
    }
}
