//! Channel consumer: receive, dispatch, acknowledge.

use crate::error::{Error, Result};

use super::ReportService;

impl ReportService {
    /// Start the worker task
    ///
    /// Spawns a background task that repeatedly takes the next deliverable
    /// message, hands it to [`ReportService::handle_message`] and settles it:
    /// acknowledged on success, released for redelivery after
    /// `channel.redelivery_delay` on failure, dead-lettered once it has been
    /// delivered `channel.max_receive_count` times. The loop idles for
    /// `channel.poll_interval` when nothing is deliverable and exits on shutdown.
    pub fn start_worker(&self) -> tokio::task::JoinHandle<()> {
        let service = self.clone();
        let poll_interval = self.config.channel.poll_interval;

        tokio::spawn(async move {
            tracing::info!("Report worker started");
            loop {
                if service.shutdown.is_cancelled() {
                    break;
                }

                let idle = match service.process_next_message().await {
                    Ok(handled) => !handled,
                    Err(e) => {
                        tracing::error!(error = %e, "Report worker failed to poll the channel");
                        true
                    }
                };

                if idle {
                    tokio::select! {
                        _ = service.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
            tracing::info!("Report worker stopped");
        })
    }

    /// Receive and settle one message
    ///
    /// Returns `false` when nothing was deliverable. Errors are channel
    /// failures only; handler failures are settled on the message.
    pub async fn process_next_message(&self) -> Result<bool> {
        let channel = &self.config.channel;

        let Some(envelope) = self.channel.receive(channel.visibility_timeout).await? else {
            return Ok(false);
        };

        let message = match envelope.decode() {
            Ok(message) => message,
            Err(e) => {
                self.channel.dead_letter(&envelope, &e.to_string()).await?;
                return Ok(true);
            }
        };

        match self.handle_message(message).await {
            Ok(()) => self.channel.ack(&envelope).await?,
            Err(Error::ShuttingDown) => {
                self.channel
                    .release(&envelope, std::time::Duration::ZERO, "interrupted by shutdown")
                    .await?
            }
            Err(e) if envelope.receive_count >= channel.max_receive_count => {
                self.channel.dead_letter(&envelope, &e.to_string()).await?
            }
            Err(e) => {
                tracing::warn!(
                    message_id = envelope.id,
                    dedup_key = %envelope.dedup_key,
                    receive_count = envelope.receive_count,
                    error = %e,
                    "Message handling failed, scheduling redelivery"
                );
                self.channel
                    .release(&envelope, channel.redelivery_delay, &e.to_string())
                    .await?
            }
        }

        Ok(true)
    }
}
