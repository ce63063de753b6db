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

use std::sync::Once;

use tracing::subscriber;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::common::TracingConfig;

static INIT: Once = Once::new();

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. When
/// `config.log_directory` is set, output is written to a daily rolling file
/// there as well as to stdout. Only the first call has any effect.
pub fn initialize_tracing(config: &TracingConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let builder = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .compact()
            .with_line_number(false)
            .with_target(true)
            .with_env_filter(filter);

        let file_appender = config.log_directory.as_ref().and_then(|directory| {
            std::fs::create_dir_all(directory).ok()?;
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(config.log_file.clone())
                .build(directory)
                .ok()
        });

        let installed = match file_appender {
            Some(appender) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                // The writer must outlive every span, so the guard lives until exit.
                Box::leak(Box::new(guard));
                subscriber::set_global_default(
                    builder
                        .with_ansi(false)
                        .with_writer(std::io::stdout.and(non_blocking))
                        .finish(),
                )
            }
            None => subscriber::set_global_default(builder.finish()),
        };

        if let Err(e) = installed {
            eprintln!("tracing subscriber not installed: {e}");
        }
    });
}
