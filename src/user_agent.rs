//! Randomized browser user-agent strings.

use crate::random::{Chooser, ThreadRandom};
use crate::utils;

use log::warn;
use std::path::Path;
use std::sync::Arc;

/// Returned when no user-agent list is available at all.
pub const FALLBACK_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const BUILTIN_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

/// Supplies a plausible browser user-agent for each attempt.
pub trait UserAgentSource: Send + Sync {
    fn random(&self) -> String;
}

/// A fixed list of user-agents sampled uniformly.
#[derive(Clone)]
pub struct UserAgentList {
    agents: Arc<[String]>,
    chooser: Arc<dyn Chooser>,
}

impl UserAgentList {
    pub fn new(agents: Vec<String>) -> Self {
        Self {
            agents: agents.into(),
            chooser: Arc::new(ThreadRandom),
        }
    }

    /// The bundled desktop browser list.
    pub fn builtin() -> Self {
        Self::new(BUILTIN_USER_AGENTS.iter().map(|ua| ua.to_string()).collect())
    }

    /// Load one user-agent per line. Falls back to [`UserAgentList::builtin`]
    /// when the file cannot be read or holds no entries.
    pub async fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let agents = utils::parse_user_agent_list(&content);
                if agents.is_empty() {
                    warn!("User-agent file {} is empty, using built-in list", path.display());
                    Self::builtin()
                } else {
                    Self::new(agents)
                }
            }
            Err(e) => {
                warn!("Failed to read user-agent file {}: {}", path.display(), e);
                Self::builtin()
            }
        }
    }

    pub fn with_chooser(mut self, chooser: Arc<dyn Chooser>) -> Self {
        self.chooser = chooser;
        self
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for UserAgentList {
    fn default() -> Self {
        Self::builtin()
    }
}

impl UserAgentSource for UserAgentList {
    fn random(&self) -> String {
        if self.agents.is_empty() {
            return FALLBACK_USER_AGENT.to_string();
        }
        let idx = self.chooser.index(self.agents.len()).min(self.agents.len() - 1);
        self.agents[idx].clone()
    }
}
