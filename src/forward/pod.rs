use std::{
    net::SocketAddr,
    sync::{Mutex, PoisonError},
};

use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tokio::{
    net::{TcpListener, TcpStream},
    task::{AbortHandle, JoinSet},
};
use tracing::{debug, info, warn};

use super::{ForwardState, Forwarder, forward_path};
use crate::error::{BoxError, Error, Result};

/// Forwards a local TCP address to a pod port.
///
/// Every accepted connection opens its own port-forward stream to the pod.
pub struct PodForward {
    path: String,
    local_addr: SocketAddr,
    remote_port: u16,
    task: Mutex<Option<AbortHandle>>,
}

impl PodForward {
    /// Binds `local_addr` and starts forwarding to `remote_port` of the pod.
    pub async fn start(
        client: Client,
        namespace: &str,
        pod: &str,
        container: &str,
        local_addr: SocketAddr,
        remote_port: u16,
    ) -> Result<Self> {
        let path = forward_path(namespace, pod, container);
        let forward_err = |source: std::io::Error| Error::Forward {
            path: path.clone(),
            source: source.into(),
        };
        let listener = TcpListener::bind(local_addr).await.map_err(forward_err)?;
        let local_addr = listener.local_addr().map_err(forward_err)?;

        info!(path = %path, %local_addr, remote_port, "port-forward started");
        let api: Api<Pod> = Api::namespaced(client, namespace);
        let task = tokio::spawn(accept(listener, api, pod.to_string(), remote_port));

        Ok(Self {
            path,
            local_addr,
            remote_port,
            task: Mutex::new(Some(task.abort_handle())),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }
}

impl Forwarder for PodForward {
    fn path(&self) -> &str {
        &self.path
    }

    fn state(&self) -> ForwardState {
        match &*self.task.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(task) if !task.is_finished() => ForwardState::Running,
            _ => ForwardState::Stopped,
        }
    }

    fn stop(&self) -> Result<()> {
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
            debug!(path = %self.path, "port-forward stopped");
        }
        Ok(())
    }
}

/// Accepts local connections until aborted; aborting drops every bridge.
async fn accept(listener: TcpListener, api: Api<Pod>, pod: String, port: u16) {
    let mut bridges = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((conn, peer)) => {
                    debug!(%peer, pod = %pod, port, "forwarding connection");
                    bridges.spawn(bridge(api.clone(), pod.clone(), port, conn));
                }
                Err(error) => {
                    warn!(%error, pod = %pod, port, "accept failed");
                    return;
                }
            },
            Some(done) = bridges.join_next() => match done {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!(%error, pod = %pod, port, "port-forward connection failed"),
                Err(error) => warn!(%error, pod = %pod, port, "port-forward connection panicked"),
            },
        }
    }
}

async fn bridge(api: Api<Pod>, pod: String, port: u16, mut conn: TcpStream) -> Result<(), BoxError> {
    let mut forwarder = api.portforward(&pod, &[port]).await?;
    let mut upstream = forwarder
        .take_stream(port)
        .ok_or_else(|| format!("port {port} is not forwarded"))?;
    tokio::io::copy_bidirectional(&mut conn, &mut upstream).await?;
    drop(upstream);
    forwarder.join().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use kube::{Client, Config};

    use super::PodForward;
    use crate::forward::{ForwardState, Forwarder};

    #[tokio::test]
    async fn stops_once() {
        let config = Config::new("http://127.0.0.1:9".parse().expect("valid uri"));
        let client = Client::try_from(config).expect("client");
        let fwd = PodForward::start(
            client,
            "default",
            "nginx",
            "web",
            "127.0.0.1:0".parse().expect("valid addr"),
            80,
        )
        .await
        .expect("listener should bind");

        assert_eq!(fwd.path(), "default/nginx/web");
        assert_ne!(fwd.local_addr().port(), 0);
        assert_eq!(fwd.remote_port(), 80);
        assert_eq!(fwd.state(), ForwardState::Running);

        fwd.stop().expect("stop");
        assert_eq!(fwd.state(), ForwardState::Stopped);
        fwd.stop().expect("second stop is a no-op");
    }
}
