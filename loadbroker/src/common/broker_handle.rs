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

use std::sync::Arc;
use std::time::Duration;

use loadbroker_core::traits::Channel;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::common::{BrokerError, BrokerLoop, BrokerStats};

type LoopOutcome<F, B> = (BrokerLoop<F, B>, Result<(), BrokerError>);

/// Handle to a broker loop running on its own task.
#[derive(Debug)]
pub struct BrokerHandle<F, B> {
    stats: Arc<BrokerStats>,
    cancel_token: CancellationToken,
    task: JoinHandle<LoopOutcome<F, B>>,
}

impl<F, B> BrokerLoop<F, B>
where
    F: Channel + 'static,
    B: Channel + 'static,
{
    /// Moves the loop onto a Tokio task and returns a handle to it.
    pub fn spawn(mut self) -> BrokerHandle<F, B> {
        let stats = self.stats();
        let cancel_token = self.cancellation_token();
        let task = tokio::spawn(async move {
            let result = self.run().await;
            (self, result)
        });
        BrokerHandle {
            stats,
            cancel_token,
            task,
        }
    }
}

impl<F, B> BrokerHandle<F, B> {
    /// Requests the loop to stop at its next check.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// True once a stop has been requested, either here or by the loop itself
    /// after a fatal error.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// The loop's live counters.
    #[must_use]
    pub fn stats(&self) -> Arc<BrokerStats> {
        self.stats.clone()
    }

    /// Token shared with the loop.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Waits for the loop to finish on its own and hands it back.
    ///
    /// # Errors
    ///
    /// The loop's own [`BrokerError`], or [`BrokerError::Task`] if the task
    /// panicked.
    pub async fn join(self) -> Result<BrokerLoop<F, B>, BrokerError> {
        match self.task.await {
            Ok((broker, Ok(()))) => Ok(broker),
            Ok((_, Err(e))) => Err(e),
            Err(join_error) => {
                error!("broker task failed: {join_error}");
                Err(BrokerError::Task(join_error.to_string()))
            }
        }
    }

    /// Stops the loop and waits up to `timeout` for it to finish.
    ///
    /// # Errors
    ///
    /// [`BrokerError::ShutdownTimeout`] if the loop is still running at the
    /// deadline; the task is aborted in that case. Otherwise as [`join`](Self::join).
    pub async fn shutdown(self, timeout: Duration) -> Result<BrokerLoop<F, B>, BrokerError> {
        self.stop();
        let abort = self.task.abort_handle();
        match tokio::time::timeout(timeout, self.join()).await {
            Ok(result) => {
                info!("broker stopped");
                result
            }
            Err(_) => {
                warn!(?timeout, "broker did not stop in time; aborting");
                abort.abort();
                Err(BrokerError::ShutdownTimeout(timeout))
            }
        }
    }
}
