//! Pod log fetch and streaming.

use futures::{AsyncBufReadExt, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use k0rdent_core::{bounded_queue, QueueReceiver, Result};
use kube::api::LogParams;
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::map_kube_error;

const LOG_QUEUE_CAPACITY: usize = 512;

#[derive(Debug, Clone)]
pub struct LogQuery {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub since_seconds: Option<i64>,
    pub tail_lines: Option<i64>,
}

impl LogQuery {
    fn params(&self, follow: bool) -> LogParams {
        LogParams {
            container: Some(self.container.clone()),
            follow,
            since_seconds: self.since_seconds,
            tail_lines: self.tail_lines,
            timestamps: false,
            ..Default::default()
        }
    }
}

pub struct LogProvider {
    client: Client,
}

impl LogProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// One-shot log fetch for the tool surface.
    pub async fn fetch(&self, query: &LogQuery) -> Result<String> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &query.namespace);
        api.logs(&query.pod, &query.params(false))
            .await
            .map_err(map_kube_error)
    }

    /// Follow logs line by line on a bounded drop-oldest queue. The stream
    /// ends when the container does (a restart requires a new subscription);
    /// the queue closes either way.
    pub async fn stream(
        &self,
        query: &LogQuery,
        cancel: CancellationToken,
    ) -> Result<QueueReceiver<String>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &query.namespace);
        let reader = api
            .log_stream(&query.pod, &query.params(true))
            .await
            .map_err(map_kube_error)?;

        let (tx, rx) = bounded_queue(LOG_QUEUE_CAPACITY);
        let target = format!("{}/{}/{}", query.namespace, query.pod, query.container);

        tokio::spawn(async move {
            let mut lines = Box::pin(reader.lines());
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    line = lines.next() => match line {
                        Some(Ok(line)) => {
                            tx.push(line);
                        }
                        Some(Err(err)) => {
                            debug!("log stream {target} read error: {err}");
                            break;
                        }
                        None => {
                            debug!("log stream {target} ended");
                            break;
                        }
                    }
                }
            }
            tx.close();
        });

        Ok(rx)
    }
}
