use serde_json::json;
use signal_sync::channel::memory::{MemoryPeer, MemoryTransport};
use signal_sync::config::Settings;
use signal_sync::countdown::SessionPhase;
use signal_sync::devices::StaticSnapshot;
use signal_sync::error::InvokeError;
use signal_sync::events::DashboardEvent;
use signal_sync::{ConnectionState, Device, Phase, SignalSync};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

struct Harness {
    sync: SignalSync,
    transport: MemoryTransport,
    events: broadcast::Receiver<DashboardEvent>,
    peer: MemoryPeer,
}

async fn started(devices: Vec<Device>) -> Harness {
    let settings = Settings::from_toml("").unwrap();
    let transport = MemoryTransport::new();
    let sync = SignalSync::new(
        &settings,
        Arc::new(transport.clone()),
        Arc::new(StaticSnapshot::new(devices)),
    );
    assert_eq!(sync.refresh_snapshot().await.unwrap(), sync.devices().len());
    let mut events = sync.bus().subscribe();
    sync.start().await;
    let peer = transport.accept().await.unwrap();
    wait_for(&mut events, |e| {
        matches!(e, DashboardEvent::Connection(ConnectionState::Connected))
    })
    .await;
    Harness {
        sync,
        transport,
        events,
        peer,
    }
}

async fn wait_for<F>(events: &mut broadcast::Receiver<DashboardEvent>, mut pred: F) -> DashboardEvent
where
    F: FnMut(&DashboardEvent) -> bool,
{
    timeout(Duration::from_secs(120), async {
        loop {
            let event = events.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event did not arrive")
}

async fn updated(events: &mut broadcast::Receiver<DashboardEvent>) -> Device {
    match wait_for(events, |e| matches!(e, DashboardEvent::DeviceUpdated(_))).await {
        DashboardEvent::DeviceUpdated(device) => device,
        _ => unreachable!(),
    }
}

async fn countdown(
    events: &mut broadcast::Receiver<DashboardEvent>,
) -> signal_sync::countdown::CountdownTick {
    match wait_for(events, |e| matches!(e, DashboardEvent::Countdown(_))).await {
        DashboardEvent::Countdown(tick) => tick,
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn unit_action_updates_known_device() {
    let mut h = started(vec![Device::new(7, "X")]).await;
    h.peer
        .send_unit_action("room", "1", r#"{"id":7,"L1":"G","L2":"R","T1":12,"T2":0}"#)
        .await;

    let device = updated(&mut h.events).await;
    assert_eq!(device.id, 7);
    assert_eq!(device.lamp1_phase, Phase::Green);
    assert_eq!(device.lamp2_phase, Phase::Red);
    assert_eq!(device.remaining1, Some(12));
    assert_eq!(device.remaining2, Some(0));
    assert_eq!(h.sync.device(7), Some(device));
}

#[tokio::test(start_paused = true)]
async fn malformed_and_unknown_actions_do_not_break_the_stream() {
    let mut h = started(vec![Device::new(7, "X")]).await;
    h.peer.send_unit_action("room", "1", "{oops").await;
    h.peer.send_unit_action("room", "2", r#"{"L1":"G"}"#).await;
    h.peer
        .send_unit_action("room", "3", r#"{"id":99,"L1":"G"}"#)
        .await;
    h.peer
        .send_unit_action("room", "4", r#"{"signId":"7","status":"Y"}"#)
        .await;

    let device = updated(&mut h.events).await;
    assert_eq!(device.id, 7);
    assert_eq!(device.lamp1_phase, Phase::Yellow);
    assert!(h.sync.device(99).is_none());
    assert_eq!(h.sync.devices().len(), 1);
    assert_eq!(h.sync.connection_state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn generic_messages_reach_observers_and_legacy_payloads_apply() {
    let mut h = started(vec![Device::new(3, "Giza")]).await;
    h.peer.send_message("ops", "shift change").await;
    let event = wait_for(&mut h.events, |e| matches!(e, DashboardEvent::Message { .. })).await;
    let DashboardEvent::Message { name, text } = event else {
        unreachable!()
    };
    assert_eq!((name.as_str(), text.as_str()), ("ops", "shift change"));

    h.peer
        .send_message("server", r#"{"ID":3,"L1":"G","L2":"Y"}"#)
        .await;
    let device = updated(&mut h.events).await;
    assert_eq!(device.lamp2_phase, Phase::Yellow);
}

#[tokio::test(start_paused = true)]
async fn send_message_requires_a_link() {
    let mut h = started(vec![]).await;
    h.sync.send_message("ops", "hi").await.unwrap();
    let invocation = h.peer.next_invocation().await.unwrap();
    assert_eq!(invocation.method, "SendMessage");
    assert_eq!(invocation.args, vec![json!("ops"), json!("hi")]);

    h.sync.shutdown().await;
    assert_eq!(
        h.sync.send_message("ops", "hi").await,
        Err(InvokeError::NotConnected)
    );
    assert_eq!(h.sync.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn focused_countdown_follows_pushes_and_link_state() {
    let mut h = started(vec![Device::new(7, "X"), Device::new(8, "Y")]).await;
    h.sync.focus(7).await;
    h.peer
        .send_unit_action("room", "1", r#"{"id":7,"L1":"G","L2":"R","T1":5,"T2":3}"#)
        .await;

    let armed = countdown(&mut h.events).await;
    assert_eq!((armed.ticks1, armed.ticks2), (Some(5), Some(3)));
    for _ in 0..3 {
        countdown(&mut h.events).await;
    }
    let view = h.sync.focus_view().await;
    assert_eq!((view.ticks1, view.ticks2), (Some(2), Some(0)));

    // Pushes for other devices leave the session alone.
    h.peer
        .send_unit_action("room", "2", r#"{"id":8,"T1":40}"#)
        .await;
    let tick = countdown(&mut h.events).await;
    assert_eq!((tick.device_id, tick.ticks1), (7, Some(1)));

    // Link drop stops ticking; the reconnect alone does not resume it.
    h.peer.close();
    let stopped = countdown(&mut h.events).await;
    assert_eq!(stopped.phase, SessionPhase::Idle);
    let peer = h.transport.accept().await.unwrap();
    wait_for(&mut h.events, |e| {
        matches!(e, DashboardEvent::Connection(ConnectionState::Connected))
    })
    .await;
    let idle = timeout(Duration::from_secs(5), countdown(&mut h.events)).await;
    assert!(idle.is_err());

    peer.send_unit_action("room", "3", r#"{"id":7,"T1":10}"#)
        .await;
    let rearmed = countdown(&mut h.events).await;
    assert_eq!((rearmed.ticks1, rearmed.ticks2), (Some(10), None));
    let next = countdown(&mut h.events).await;
    assert_eq!(next.ticks1, Some(9));

    h.sync.clear_focus().await;
    assert_eq!(h.sync.focus_view().await.phase, SessionPhase::Idle);
}
