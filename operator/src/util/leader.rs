use kube::client::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use std::future::Future;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs `spawn_controller` only while this replica holds the named lease
/// (spec.md §5 "The operator runs as a process-wide singleton
/// (leader-elected)"). On leadership loss or a renewal error, the spawned
/// task is aborted; it is respawned once leadership is reacquired.
///
/// The teacher runs every reconcile loop unconditionally; this helper is
/// shared by all three `run()` entrypoints so the leader-election loop
/// itself is written once.
pub async fn run_leader_elected<F, Fut>(client: Client, lease_name: &str, holder_prefix: &str, spawn_controller: F)
where
    F: Fn(Client) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let lease_namespace = std::env::var("NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("{holder_prefix}-{}", uuid::Uuid::new_v4()));
    let lease_ttl = Duration::from_secs(15);
    let renew_every = Duration::from_secs(5);
    let leadership = LeaseLock::new(
        client.clone(),
        &lease_namespace,
        LeaseLockParams {
            holder_id,
            lease_name: lease_name.to_owned(),
            lease_ttl,
        },
    );

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_signal.cancel();
    });

    let mut controller_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(renew_every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = controller_task.take() {
                    task.abort();
                    let _ = task.await;
                }
                return;
            }
            _ = tick.tick() => {}
        }

        let lease = match leadership.try_acquire_or_renew().await {
            Ok(lease) => lease,
            Err(e) => {
                eprintln!("leader election renew/acquire failed: {e}");
                if let Some(task) = controller_task.take() {
                    task.abort();
                    eprintln!("aborted controller due to leader election error");
                }
                continue;
            }
        };

        match lease {
            LeaseLockResult::Acquired(_) => {
                if controller_task.is_none() {
                    println!("{lease_name}: acquired leadership; starting controller");
                    controller_task = Some(tokio::spawn(spawn_controller(client.clone())));
                }
            }
            LeaseLockResult::NotAcquired => {
                if let Some(task) = controller_task.take() {
                    println!("{lease_name}: lost leadership; stopping controller");
                    task.abort();
                    let _ = task.await;
                }
            }
        }
    }
}
