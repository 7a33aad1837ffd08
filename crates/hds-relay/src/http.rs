//! Shared HTTP serving for every listener

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Serve `router` on an already bound listener until the process stops.
///
/// Handlers may extract `ConnectInfo<SocketAddr>`.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    let router = router.layer(TraceLayer::new_for_http());
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
