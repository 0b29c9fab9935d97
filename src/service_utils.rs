use crate::dashboard::Dashboard;
use crate::display::StatusView;
use crate::models::UserAction;
use crate::session::{Session, SessionEvent};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

/// How long a shutdown waits for the broker to acknowledge the disconnect.
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Run the dashboard until `shutdown` resolves or both input channels close.
/// The session is then closed cleanly before returning.
///
/// Session events, user actions and retry timers are all handled on this one
/// task, so the controller is never touched concurrently.
pub async fn run_dashboard<S, D, F>(
    mut dashboard: Dashboard<S, D>,
    mut events: UnboundedReceiver<SessionEvent>,
    mut actions: UnboundedReceiver<UserAction>,
    shutdown: F,
) where
    S: Session,
    D: StatusView,
    F: Future<Output = ()>,
{
    let (retry_tx, mut retry_rx) = mpsc::unbounded_channel::<()>();
    tokio::pin!(shutdown);

    dashboard.connect();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Dashboard is shutting down...");
                break;
            }
            Some(event) = events.recv() => event.dispatch(&mut dashboard),
            Some(action) = actions.recv() => dashboard.perform(action),
            Some(()) = retry_rx.recv() => dashboard.connect(),
            else => {
                warn!("Dashboard inputs closed.");
                break;
            }
        }

        if let Some(delay) = dashboard.take_scheduled_retry() {
            info!("Retrying connection in {:?}...", delay);
            schedule_retry(retry_tx.clone(), delay);
        }
    }

    dashboard.disconnect();
    await_disconnect(&mut dashboard, &mut events).await;
}

/// Keep dispatching session events until the session ends, so the disconnect
/// request reaches the broker before the session is dropped.
async fn await_disconnect<S, D>(dashboard: &mut Dashboard<S, D>, events: &mut UnboundedReceiver<SessionEvent>)
where
    S: Session,
    D: StatusView,
{
    let closed = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
        while let Some(event) = events.recv().await {
            let ended = matches!(event, SessionEvent::ConnectionLost(_) | SessionEvent::Failed(_));
            event.dispatch(&mut *dashboard);
            if ended {
                break;
            }
        }
    })
    .await;

    match closed {
        Ok(()) => info!("Session closed."),
        Err(_) => warn!("Broker did not confirm the disconnect within {:?}.", DISCONNECT_TIMEOUT),
    }
}

/// Post a reconnect request back to the loop once `delay` has elapsed.
fn schedule_retry(retry_tx: UnboundedSender<()>, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = retry_tx.send(());
    });
}

/// Resolve on Ctrl-C.
pub async fn handle_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to handle termination signal: {:?}", e);
        // Without a signal handler the dashboard runs until killed.
        std::future::pending::<()>().await;
    }
}
