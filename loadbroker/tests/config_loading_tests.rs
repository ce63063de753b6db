/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */
use std::fs;
use std::time::Duration;

use loadbroker::prelude::*;
use loadbroker_test::prelude::*;
use tempfile::TempDir;

use crate::setup::{initialize_tracing, quick_config};

mod setup;

/// A file in the XDG config directory is picked up by `load`.
#[loadbroker_test]
async fn test_xdg_configuration_is_loaded() -> anyhow::Result<()> {
    initialize_tracing();
    let temp_dir = TempDir::new()?;
    let config_dir = temp_dir.path().join("loadbroker");
    fs::create_dir_all(&config_dir)?;

    let config_content = r#"
        [broker]
        poll_timeout_ms = 250

        [harness]
        clients = 4
        workers = 2

        [timeouts]
        shutdown_timeout_ms = 3000
    "#;
    fs::write(config_dir.join("config.toml"), config_content)?;
    std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());

    let config = LoadBrokerConfig::load();
    assert_eq!(config.poll_timeout(), Duration::from_millis(250));
    assert_eq!(config.harness.clients, 4);
    assert_eq!(config.harness.workers, 2);
    assert_eq!(config.shutdown_timeout(), Duration::from_secs(3));
    assert_eq!(config.harness.requests_per_client, 1);
    assert_eq!(config.broker.ready_marker, "READY");

    // A malformed file falls back to the defaults.
    fs::write(config_dir.join("config.toml"), "[broker]\npoll_timeout_ms = \"soon\"\n")?;
    let config = LoadBrokerConfig::load();
    assert_eq!(config.poll_timeout(), Duration::from_secs(1));
    assert_eq!(config.harness.clients, 10);

    temp_dir.close()?;
    Ok(())
}

/// `load_from` reports errors instead of falling back.
#[loadbroker_test]
async fn test_explicit_path_reports_errors() -> anyhow::Result<()> {
    initialize_tracing();
    let temp_dir = TempDir::new()?;

    let missing = LoadBrokerConfig::load_from(&temp_dir.path().join("absent.toml"));
    assert!(matches!(missing, Err(ConfigError::Read { .. })));

    let path = temp_dir.path().join("bad.toml");
    fs::write(&path, "[limits]\nchannel_capacity = -1\n")?;
    assert!(matches!(LoadBrokerConfig::load_from(&path), Err(ConfigError::Parse(_))));

    temp_dir.close()?;
    Ok(())
}

/// A loaded configuration drives the harness end to end.
#[loadbroker_test]
async fn test_file_configuration_runs_the_harness() -> anyhow::Result<()> {
    initialize_tracing();
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("config.toml");
    let config_content = r#"
        [broker]
        poll_timeout_ms = 20
        ready_marker = "IDLE"

        [harness]
        clients = 3
        workers = 2
        requests_per_client = 2
        frontend = "inproc://file-front"
        backend = "inproc://file-back"
        reply_payload = "DONE"

        [limits]
        channel_capacity = 4
    "#;
    fs::write(&path, config_content)?;

    let config = LoadBrokerConfig::load_from(&path)?;
    config.validate()?;
    let report = LoadBrokerApp::launch(config).await?;

    assert_eq!(report.total_replies(), 6);
    for (_, replies) in &report.client_replies {
        for reply in replies {
            assert_eq!(reply, &vec![bytes::Bytes::from_static(b"DONE")]);
        }
    }
    assert_eq!(report.stats.ready_announcements, 2);

    temp_dir.close()?;
    Ok(())
}

/// Invalid values are rejected before anything is bound.
#[loadbroker_test]
async fn test_invalid_configuration_is_rejected_by_launch() -> anyhow::Result<()> {
    initialize_tracing();
    let mut config = quick_config(1, 1, 1);
    config.harness.backend = config.harness.frontend.clone();
    assert!(LoadBrokerApp::launch(config).await.is_err());
    Ok(())
}
