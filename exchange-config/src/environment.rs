use std::fmt;
use std::io::Error;
use std::str::FromStr;

/// Name of the environment variable selecting the runtime environment.
const APP_ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

const DEV_ENV_NAME: &str = "dev";
const STAGING_ENV_NAME: &str = "staging";
const PROD_ENV_NAME: &str = "prod";

/// Runtime environment selecting which configuration overrides are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Local development.
    Dev,
    /// Pre-production cluster.
    Staging,
    /// Production cluster.
    Prod,
}

impl Environment {
    /// Loads the environment from `APP_ENVIRONMENT`, defaulting to [`Environment::Dev`].
    pub fn load() -> Result<Environment, Error> {
        match std::env::var(APP_ENVIRONMENT_ENV_NAME) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Environment::Dev),
        }
    }

    /// Returns the file stem used for this environment's configuration file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => DEV_ENV_NAME,
            Environment::Staging => STAGING_ENV_NAME,
            Environment::Prod => PROD_ENV_NAME,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = Error;

    /// Parses an environment name case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            DEV_ENV_NAME => Ok(Self::Dev),
            STAGING_ENV_NAME => Ok(Self::Staging),
            PROD_ENV_NAME => Ok(Self::Prod),
            other => Err(Error::other(format!(
                "{other} is not a supported environment. Use one of `{DEV_ENV_NAME}`, `{STAGING_ENV_NAME}` or `{PROD_ENV_NAME}`.",
            ))),
        }
    }
}
