use std::borrow::Cow;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory containing configuration files relative to the application root.
const CONFIGURATION_DIR: &str = "configuration";

/// Extensions tried, in order, for every configuration file.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "APP";

const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested keys in environment variables (`APP_DISTRIBUTION__PAGE_SIZE`).
const ENV_SEPARATOR: &str = "__";

/// Implemented by top-level configuration structures loadable through [`load_config`].
pub trait Config {
    /// Keys whose environment values are parsed as comma separated lists.
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

#[derive(Debug, Clone, Copy)]
enum ConfigFileKind {
    Base,
    Environment(Environment),
}

impl ConfigFileKind {
    fn stem(&self) -> Cow<'static, str> {
        match self {
            ConfigFileKind::Base => Cow::Borrowed("base"),
            ConfigFileKind::Environment(env) => Cow::Borrowed(env.as_str()),
        }
    }
}

impl fmt::Display for ConfigFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFileKind::Base => f.write_str("base configuration"),
            ConfigFileKind::Environment(env) => write!(f, "{env} environment configuration"),
        }
    }
}

/// Errors raised while loading configuration files and overrides.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    #[error("could not locate {kind_description} in `{directory}`; attempted: {attempted}")]
    ConfigurationFileMissing {
        kind_description: String,
        directory: PathBuf,
        attempted: String,
    },

    #[error("failed to load {kind_description} from `{path}`: {source}")]
    ConfigurationFileLoad {
        kind_description: String,
        path: PathBuf,
        source: config::ConfigError,
    },

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] io::Error),

    #[error("failed to build configuration: {0}")]
    Builder(#[source] config::ConfigError),

    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] config::ConfigError),
}

/// Loads configuration relative to the current working directory.
///
/// See [`load_config_from`] for the layering rules.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let environment = Environment::load()?;

    load_config_from(&base_path, environment)
}

/// Loads layered configuration from `base_path/configuration`.
///
/// `base.(yaml|yml|json)` is required. `{environment}.(yaml|yml|json)` is applied on top when
/// present, and `APP_`-prefixed environment variables win over both files.
pub fn load_config_from<T>(base_path: &Path, environment: Environment) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let configuration_directory = base_path.join(CONFIGURATION_DIR);
    if !configuration_directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            configuration_directory,
        ));
    }

    let base_file = find_configuration_file(&configuration_directory, ConfigFileKind::Base)?;
    let builder = config::Config::builder().add_source(config::File::from(base_file.clone()));
    validate_configuration_source(&builder, ConfigFileKind::Base, &base_file)?;

    let environment_kind = ConfigFileKind::Environment(environment);
    let builder = match find_configuration_file(&configuration_directory, environment_kind) {
        Ok(environment_file) => {
            let builder = builder.add_source(config::File::from(environment_file.clone()));
            validate_configuration_source(&builder, environment_kind, &environment_file)?;
            builder
        }
        Err(LoadConfigError::ConfigurationFileMissing { .. }) => builder,
        Err(err) => return Err(err),
    };

    let mut environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true);
    if !T::LIST_PARSE_KEYS.is_empty() {
        environment_source = environment_source.list_separator(",");
        for key in T::LIST_PARSE_KEYS {
            environment_source = environment_source.with_list_parse_key(key);
        }
    }

    let settings = builder
        .add_source(environment_source)
        .build()
        .map_err(LoadConfigError::Builder)?;

    settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

fn find_configuration_file(
    directory: &Path,
    kind: ConfigFileKind,
) -> Result<PathBuf, LoadConfigError> {
    let stem = kind.stem();
    let mut attempted = Vec::with_capacity(CONFIG_FILE_EXTENSIONS.len());

    for extension in CONFIG_FILE_EXTENSIONS {
        let path = directory.join(format!("{stem}.{extension}"));
        if path.is_file() {
            return Ok(path);
        }
        attempted.push(format!("`{}`", path.display()));
    }

    Err(LoadConfigError::ConfigurationFileMissing {
        kind_description: kind.to_string(),
        directory: directory.to_path_buf(),
        attempted: attempted.join(", "),
    })
}

fn validate_configuration_source(
    builder: &ConfigBuilder<DefaultState>,
    kind: ConfigFileKind,
    path: &Path,
) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map(|_| ())
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            kind_description: kind.to_string(),
            path: path.to_path_buf(),
            source,
        })
}
