use signal_sync::ConnectionState;
use signal_sync::channel::ChannelAdapter;
use signal_sync::channel::memory::MemoryTransport;
use signal_sync::supervisor::ConnectionSupervisor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn supervisor(transport: &MemoryTransport) -> Arc<ConnectionSupervisor> {
    let adapter = ChannelAdapter::new(Arc::new(transport.clone()), 64);
    Arc::new(ConnectionSupervisor::new(adapter, ms(1000), ms(10_000), 64))
}

fn supervisor_with_timeout(
    transport: &MemoryTransport,
    connect_timeout: Duration,
) -> Arc<ConnectionSupervisor> {
    let adapter =
        ChannelAdapter::with_connect_timeout(Arc::new(transport.clone()), 64, connect_timeout);
    Arc::new(ConnectionSupervisor::new(adapter, ms(1000), ms(10_000), 64))
}

async fn wait_state(rx: &mut broadcast::Receiver<ConnectionState>, want: ConnectionState) {
    while rx.recv().await.unwrap() != want {}
}

fn gaps(times: &[tokio::time::Instant]) -> Vec<u64> {
    times
        .windows(2)
        .map(|w| (w[1] - w[0]).as_millis() as u64)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn retries_back_off_and_reset_after_success() {
    let transport = MemoryTransport::new();
    transport.refuse_connections(true);
    let supervisor = supervisor(&transport);
    let mut transitions = supervisor.subscribe();
    let _handle = supervisor.spawn();

    tokio::time::sleep(ms(34_500)).await;
    let times = transport.attempt_times().await;
    assert_eq!(gaps(&times), vec![2000, 4000, 8000, 10_000, 10_000]);
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);

    transport.refuse_connections(false);
    let peer = transport.accept().await.unwrap();
    wait_state(&mut transitions, ConnectionState::Connected).await;
    let times = transport.attempt_times().await;
    assert_eq!(gaps(&times).last(), Some(&10_000));

    peer.close();
    wait_state(&mut transitions, ConnectionState::Disconnected).await;
    let _peer = transport.accept().await.unwrap();
    wait_state(&mut transitions, ConnectionState::Connected).await;
    let times = transport.attempt_times().await;
    assert_eq!(gaps(&times).last(), Some(&1000));
}

#[tokio::test(start_paused = true)]
async fn transitions_are_published_in_order() {
    let transport = MemoryTransport::new();
    let supervisor = supervisor(&transport);
    let mut transitions = supervisor.subscribe();
    assert_eq!(supervisor.state(), ConnectionState::Connecting);
    let _handle = supervisor.spawn();

    let peer = transport.accept().await.unwrap();
    assert_eq!(transitions.recv().await.unwrap(), ConnectionState::Connected);

    peer.announce_reconnecting().await;
    assert_eq!(
        transitions.recv().await.unwrap(),
        ConnectionState::Reconnecting
    );
    assert_eq!(transitions.recv().await.unwrap(), ConnectionState::Connecting);
    let peer = transport.accept().await.unwrap();
    assert_eq!(transitions.recv().await.unwrap(), ConnectionState::Connected);

    peer.close();
    assert_eq!(
        transitions.recv().await.unwrap(),
        ConnectionState::Disconnected
    );
    assert_eq!(transitions.recv().await.unwrap(), ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn independent_supervisors_do_not_share_state() {
    let up = MemoryTransport::new();
    let down = MemoryTransport::new();
    down.refuse_connections(true);
    let first = supervisor(&up);
    let second = supervisor(&down);
    let mut first_rx = first.subscribe();
    let _a = first.spawn();
    let _b = second.spawn();

    let _peer = up.accept().await.unwrap();
    wait_state(&mut first_rx, ConnectionState::Connected).await;
    tokio::time::sleep(ms(100)).await;
    assert_eq!(first.state(), ConnectionState::Connected);
    assert_eq!(second.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_retrying() {
    let transport = MemoryTransport::new();
    let supervisor = supervisor(&transport);
    let handle = supervisor.spawn();
    let _peer = transport.accept().await.unwrap();

    handle.shutdown().await;
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    assert!(!supervisor.adapter().is_connected().await);

    let attempts = transport.attempts().await;
    tokio::time::sleep(ms(60_000)).await;
    assert_eq!(transport.attempts().await, attempts);
}

#[tokio::test(start_paused = true)]
async fn hung_connect_times_out_and_retries() {
    let transport = MemoryTransport::new();
    transport.stall_connections(true);
    let supervisor = supervisor_with_timeout(&transport, ms(5000));
    let mut transitions = supervisor.subscribe();
    let _handle = supervisor.spawn();

    // Attempts at 0, 7000 (5000 timeout + 2000 backoff), 16000.
    tokio::time::sleep(ms(17_000)).await;
    let times = transport.attempt_times().await;
    assert_eq!(gaps(&times), vec![7000, 9000]);
    assert_eq!(
        transitions.recv().await.unwrap(),
        ConnectionState::Disconnected
    );
    assert_eq!(transitions.recv().await.unwrap(), ConnectionState::Connecting);

    transport.stall_connections(false);
    let _peer = transport.accept().await.unwrap();
    wait_state(&mut transitions, ConnectionState::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_pending_connect() {
    let transport = MemoryTransport::new();
    transport.stall_connections(true);
    let supervisor = supervisor_with_timeout(&transport, ms(60_000));
    let handle = supervisor.spawn();
    tokio::time::sleep(ms(100)).await;
    assert_eq!(transport.attempts().await, 1);

    let started = tokio::time::Instant::now();
    handle.shutdown().await;
    assert!(started.elapsed() < ms(1000));
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn explicit_disconnect_is_seen_as_loss_and_reconnects() {
    let transport = MemoryTransport::new();
    let supervisor = supervisor(&transport);
    let mut transitions = supervisor.subscribe();
    let _handle = supervisor.spawn();
    let _first = transport.accept().await.unwrap();
    wait_state(&mut transitions, ConnectionState::Connected).await;

    let link = supervisor.adapter().current().await.unwrap();
    supervisor.adapter().disconnect(link).await;
    assert_eq!(
        transitions.recv().await.unwrap(),
        ConnectionState::Disconnected
    );
    assert_eq!(transitions.recv().await.unwrap(), ConnectionState::Connecting);
    let _second = transport.accept().await.unwrap();
    assert_eq!(transitions.recv().await.unwrap(), ConnectionState::Connected);
    assert_eq!(transport.attempts().await, 2);
}
