//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use ldpd::InstanceCfg;
use ldpd_utils::southbound::KernelRoute;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub logging: Logging,
    pub kernel: Kernel,
    pub ldp: InstanceCfg,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub file: LoggingFile,
    pub stdout: LoggingStdout,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFile {
    pub enabled: bool,
    pub dir: String,
    pub name: String,
    pub rotation: LoggingFileRotation,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingStdout {
    pub enabled: bool,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFmt {
    pub style: LoggingFmtStyle,
    pub colors: bool,
    pub show_thread_id: bool,
    pub show_source: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFileRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFmtStyle {
    Compact,
    Full,
    Json,
    Pretty,
}

// Routes known to the logging Route-Sync backend at startup.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Kernel {
    pub routes: Vec<KernelRoute>,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/ldpd.toml";

    pub(crate) fn load(
        config_file: Option<&str>,
    ) -> Result<Config, toml::de::Error> {
        let config_file = config_file.unwrap_or(Config::DFLT_FILEPATH);

        match std::fs::read_to_string(config_file) {
            Ok(config_str) => toml::from_str(&config_str),
            Err(err) => {
                eprintln!("Failed to load configuration file: {err}");
                eprintln!("Falling back to default configuration...");
                Ok(Config::default())
            }
        }
    }
}

// ===== impl LoggingFile =====

impl Default for LoggingFile {
    fn default() -> LoggingFile {
        LoggingFile {
            enabled: false,
            dir: "/var/log".to_owned(),
            name: "ldpd.log".to_owned(),
            rotation: Default::default(),
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingStdout =====

impl Default for LoggingStdout {
    fn default() -> LoggingStdout {
        LoggingStdout {
            enabled: true,
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingFmt =====

impl Default for LoggingFmt {
    fn default() -> LoggingFmt {
        LoggingFmt {
            style: LoggingFmtStyle::Full,
            colors: false,
            show_thread_id: false,
            show_source: false,
        }
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [logging.stdout]
            enabled = true
            style = "json"

            [logging.file]
            enabled = true
            dir = "/tmp"
            rotation = "daily"

            [[kernel.routes]]
            prefix = "10.9.0.0/16"
            gateway = "10.0.1.2"

            [ldp]
            ldp_id = "1.1.1.1"
            hello_time = 10
            loop_detection = true

            [ldp.interfaces.eth1]
            passive = true

            [ldp.neighbors."2.2.2.2"]
            password = "secret"
            "#,
        )
        .unwrap();

        assert!(matches!(
            config.logging.stdout.fmt.style,
            LoggingFmtStyle::Json
        ));
        assert!(matches!(
            config.logging.file.rotation,
            LoggingFileRotation::Daily
        ));
        assert_eq!(config.kernel.routes.len(), 1);
        assert_eq!(config.ldp.ldp_id, Some(Ipv4Addr::new(1, 1, 1, 1)));
        assert_eq!(config.ldp.hello_time, 10);
        assert_eq!(config.ldp.keepalive_time, 180);
        assert!(config.ldp.loop_detection);
        assert!(config.ldp.interfaces["eth1"].passive);
        let nbr = &config.ldp.neighbors[&Ipv4Addr::new(2, 2, 2, 2)];
        assert_eq!(nbr.password.as_deref(), Some("secret"));
    }

    #[test]
    fn unknown_fields_rejected() {
        let config = "[ldp]\nhello_interval = 5";
        assert!(toml::from_str::<Config>(config).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Some("/nonexistent/ldpd.toml")).unwrap();
        assert!(config.logging.stdout.enabled);
        assert_eq!(config.ldp.hello_time, 5);
    }
}
