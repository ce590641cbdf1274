use axum::Router;
use std::future::{Future, IntoFuture};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Serve `app` until `signal` resolves, then stop accepting connections and
/// wait at most `drain` for in-flight requests before returning.
pub async fn serve<S>(
    listener: TcpListener,
    app: Router,
    signal: S,
    drain: Duration,
) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        signal.await;
        let _ = signalled_tx.send(());
    });
    let mut server = std::pin::pin!(server.into_future());

    tokio::select! {
        result = &mut server => result,
        Ok(()) = signalled_rx => {
            tracing::info!(drain_secs = drain.as_secs_f64(), "Draining connections...");
            match tokio::time::timeout(drain, &mut server).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        drain_secs = drain.as_secs_f64(),
                        "Connections still open after drain timeout, closing"
                    );
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_returns_promptly_when_idle() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let app = Router::new().route("/", get(|| async { "ok" }));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            serve(listener, app, async {}, Duration::from_secs(30)),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_drain_is_bounded_by_timeout() {
        let started = Arc::new(Notify::new());
        let handler_started = Arc::clone(&started);
        let app = Router::new().route(
            "/hang",
            get(move || {
                let started = Arc::clone(&handler_started);
                async move {
                    started.notify_one();
                    std::future::pending::<()>().await;
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(
            listener,
            app,
            async move {
                let _ = stop_rx.await;
            },
            Duration::from_millis(200),
        ));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /hang HTTP/1.1\r\nhost: localhost\r\n\r\n")
            .await
            .unwrap();
        started.notified().await;
        stop_tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), server).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
