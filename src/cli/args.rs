use clap::{ArgAction, Args};
use std::path::PathBuf;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::log::{apply_log_level_spec, parse_log_level_spec, set_log_level, LevelFilter};

/// Options shared by every subcommand.
#[derive(Args, Debug, Default)]
pub struct BaseArgs {
    /// Path to a JSON store configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend base URL, overriding the configuration file
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Static credential sent with every request
    #[arg(long, global = true)]
    pub auth: Option<String>,

    /// Log levels, e.g. `info` or `fieldstore=trace,hyper=warn`
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// More log output: -v info, -vv debug, -vvv trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory for local snapshots, overriding the configuration file
    #[arg(long, global = true)]
    pub snapshot_dir: Option<PathBuf>,

    /// Show a progress indicator on the console while requests run
    #[arg(long, global = true)]
    pub progress: bool,
}

impl BaseArgs {
    /// Builds the store configuration from `--config`, then applies the overrides.
    ///
    /// # Errors
    /// `StoreError` if neither a file nor a base URL is given, the file does not load, or the
    /// result does not validate.
    pub fn store_config(&self) -> Result<StoreConfig, StoreError> {
        let mut config = match (&self.config, &self.base_url) {
            (Some(path), _) => StoreConfig::load(path)?,
            (None, Some(base_url)) => StoreConfig::new(base_url),
            (None, None) => return Err("either --config or --base-url is required".into()),
        };
        if let Some(base_url) = &self.base_url {
            config.base_url.clone_from(base_url);
        }
        if let Some(auth) = &self.auth {
            config.auth = Some(auth.clone());
        }
        if let Some(dir) = &self.snapshot_dir {
            config.snapshot_dir = Some(dir.clone());
        }
        config.validate()?;
        Ok(config)
    }

    /// Applies `-v` and then `--log-level`, which wins where both set a level.
    ///
    /// # Errors
    /// `StoreError` for an unrecognized level name.
    pub fn apply_logging(&self) -> Result<(), StoreError> {
        match self.verbose {
            0 => {}
            1 => set_log_level(LevelFilter::Info),
            2 => set_log_level(LevelFilter::Debug),
            _ => set_log_level(LevelFilter::Trace),
        }
        if let Some(spec) = &self.log_level {
            apply_log_level_spec(&parse_log_level_spec(spec)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn base_url_alone_is_enough() {
        let args = BaseArgs {
            base_url: Some("http://localhost:9000".to_string()),
            auth: Some("secret".to_string()),
            ..BaseArgs::default()
        };
        let config = args.store_config().unwrap();
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.auth.as_deref(), Some("secret"));
    }

    #[test]
    fn command_line_overrides_the_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"base_url": "https://db.example.test", "workers": 2}"#)
            .unwrap();
        let args = BaseArgs {
            config: Some(file.path().to_path_buf()),
            base_url: Some("http://localhost:9000".to_string()),
            snapshot_dir: Some(PathBuf::from("/tmp/fieldstore")),
            ..BaseArgs::default()
        };
        let config = args.store_config().unwrap();
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.workers, 2);
        assert_eq!(config.snapshot_dir, Some(PathBuf::from("/tmp/fieldstore")));
    }

    #[test]
    fn missing_backend_is_an_error() {
        assert!(BaseArgs::default().store_config().is_err());
    }

    #[test]
    fn bad_log_level_is_an_error() {
        let args = BaseArgs {
            log_level: Some("fieldstore=loud".to_string()),
            ..BaseArgs::default()
        };
        assert!(args.apply_logging().is_err());
    }
}
