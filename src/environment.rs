use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// Represents the different TethysDash portal deployments the CLI can target.
#[derive(Clone, Default, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Local development portal.
    Local,
    /// Staging portal for pre-production testing.
    Staging,
    /// Production portal.
    #[default]
    Production,
}

impl Environment {
    /// Returns the dashboard API base URL associated with the environment.
    pub fn portal_url(&self) -> String {
        match self {
            Environment::Local => "http://localhost:8000/apps/tethysdash".to_string(),
            Environment::Staging => "https://staging.tethysdash.org/apps/tethysdash".to_string(),
            Environment::Production => "https://tethysdash.org/apps/tethysdash".to_string(),
        }
    }
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            _ => Err(()),
        }
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Local => write!(f, "Local"),
            Environment::Staging => write!(f, "Staging"),
            Environment::Production => write!(f, "Production"),
        }
    }
}

impl Debug for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self, self.portal_url())
    }
}
