//! Full-lifecycle tests: two client sessions talking to a real broker
//! over HTTP, with the in-process event bus standing in for the external
//! hub. Events are pumped into the sessions by hand so every transition
//! is observable.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};

use ephemere_bus::{LocalBus, RoomBus};
use ephemere_client::{drive, ClientError, RoomApi, RoomPhase, RoomSession, SessionUpdate};
use ephemere_server::admission::Admission;
use ephemere_server::api::{build_router, AppState};
use ephemere_server::config::ServerConfig;
use ephemere_server::presence::PresenceTracker;
use ephemere_server::registry::RoomRegistry;
use ephemere_server::store::ServerStore;
use ephemere_shared::derive::derive_room_hash;
use ephemere_shared::{EventBody, RoomEvent, RoomSecret};
use ephemere_store::{Database, Direction};

/// Boot a broker on an ephemeral port; returns its origin and the bus.
async fn spawn_broker() -> (String, LocalBus) {
    let store = Arc::new(ServerStore::open_in_memory().unwrap());
    let registry = Arc::new(RoomRegistry::new(store.clone()));
    let presence = Arc::new(PresenceTracker::new(store));
    let bus = LocalBus::new();
    let admission = Arc::new(Admission::new(
        registry,
        presence,
        RoomBus::Local(bus.clone()),
    ));
    let state = AppState {
        admission,
        config: Arc::new(ServerConfig::default()),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    (format!("http://{addr}"), bus)
}

fn open_db(dir: &tempfile::TempDir, name: &str) -> Database {
    Database::open_at(&dir.path().join(format!("{name}.db"))).unwrap()
}

async fn open_session(
    api: &RoomApi,
    db: Database,
    secret: &RoomSecret,
) -> (RoomSession, mpsc::UnboundedReceiver<SessionUpdate>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = RoomSession::open(api.clone(), db, secret, tx)
        .await
        .unwrap();
    (session, rx)
}

async fn next_event(rx: &mut broadcast::Receiver<RoomEvent>) -> RoomEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a room event")
        .expect("event bus closed")
}

/// Deliver the next bus event to a session, as the transport would.
async fn step(session: &mut RoomSession, rx: &mut broadcast::Receiver<RoomEvent>) {
    let event = next_event(rx).await;
    session.handle_event(event).unwrap();
}

fn drain(rx: &mut mpsc::UnboundedReceiver<SessionUpdate>) -> Vec<SessionUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}

async fn wait_for_phase(session: &Arc<Mutex<RoomSession>>, phase: RoomPhase) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if session.lock().await.phase() == phase {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for a phase transition");
}

#[tokio::test]
async fn creator_is_admitted_on_open() {
    let (base, _bus) = spawn_broker().await;
    let dir = tempfile::tempdir().unwrap();
    let api = RoomApi::new(&base);

    let (session, mut updates) =
        open_session(&api, open_db(&dir, "a"), &RoomSecret::generate()).await;

    assert_eq!(session.phase(), RoomPhase::Participant);
    assert!(session.token().is_some());
    assert_eq!(
        drain(&mut updates),
        vec![SessionUpdate::PhaseChanged(RoomPhase::Participant)]
    );
}

#[tokio::test]
async fn second_device_waits_in_lobby() {
    let (base, _bus) = spawn_broker().await;
    let dir = tempfile::tempdir().unwrap();
    let secret = RoomSecret::generate();
    let api = RoomApi::new(&base);

    let (_a, _ups_a) = open_session(&api, open_db(&dir, "a"), &secret).await;
    let (b, _ups_b) = open_session(&api, open_db(&dir, "b"), &secret).await;

    // The creator's presence is fresh, so the lobby is attended.
    assert_eq!(b.phase(), RoomPhase::LobbyWaiting);
    assert!(b.token().is_none());
}

#[tokio::test]
async fn lobby_actions_require_membership() {
    let (base, _bus) = spawn_broker().await;
    let dir = tempfile::tempdir().unwrap();
    let secret = RoomSecret::generate();
    let api = RoomApi::new(&base);

    let (_a, _ups_a) = open_session(&api, open_db(&dir, "a"), &secret).await;
    let (mut b, _ups_b) = open_session(&api, open_db(&dir, "b"), &secret).await;

    assert!(matches!(
        b.send_message("sneaky").await,
        Err(ClientError::NotParticipant)
    ));
    assert!(matches!(b.approve().await, Err(ClientError::NotParticipant)));
}

#[tokio::test]
async fn knock_on_unknown_room_is_gone() {
    let (base, _bus) = spawn_broker().await;
    let api = RoomApi::new(&base);

    let hash = derive_room_hash(&RoomSecret::generate());
    assert!(matches!(
        api.knock(hash.as_str(), None).await,
        Err(ClientError::RoomGone)
    ));
}

#[tokio::test]
async fn knock_approve_message_disband_flow() {
    let (base, bus) = spawn_broker().await;
    let dir = tempfile::tempdir().unwrap();
    let secret = RoomSecret::generate();
    let api = RoomApi::new(&base);

    let (mut a, mut ups_a) = open_session(&api, open_db(&dir, "a"), &secret).await;
    assert_eq!(a.phase(), RoomPhase::Participant);

    let topic = a.room_hash().topic();
    let mut rx_a = bus.subscribe(&topic);
    let mut rx_b = bus.subscribe(&topic);

    let (mut b, mut ups_b) = open_session(&api, open_db(&dir, "b"), &secret).await;
    assert_eq!(b.phase(), RoomPhase::LobbyWaiting);
    drain(&mut ups_a);
    drain(&mut ups_b);

    // B knocks; only the participant surfaces it.
    b.knock(Some("it's me")).await.unwrap();
    step(&mut a, &mut rx_a).await;
    step(&mut b, &mut rx_b).await;
    assert!(drain(&mut ups_a).iter().any(|u| matches!(
        u,
        SessionUpdate::KnockReceived { message: Some(m), .. } if m == "it's me"
    )));
    assert!(drain(&mut ups_b).is_empty());

    // A approves; the broadcast token is claimed by B, not re-claimed by A.
    a.approve().await.unwrap();
    step(&mut a, &mut rx_a).await;
    step(&mut b, &mut rx_b).await;
    assert_eq!(a.phase(), RoomPhase::Participant);
    assert_eq!(b.phase(), RoomPhase::Participant);
    assert!(b.token().is_some());
    assert_ne!(a.token(), b.token());
    drain(&mut ups_a);
    drain(&mut ups_b);

    // B sends; the optimistic local copy lands immediately.
    b.set_handle("bee").unwrap();
    let msg_id = b.send_message("hello from b").await.unwrap();
    assert!(drain(&mut ups_b).iter().any(|u| matches!(
        u,
        SessionUpdate::Message(m) if m.id == msg_id && m.direction == Direction::Out
    )));

    // A decrypts the relayed ciphertext.
    step(&mut a, &mut rx_a).await;
    let received = drain(&mut ups_a)
        .into_iter()
        .find_map(|u| match u {
            SessionUpdate::Message(m) => Some(m),
            _ => None,
        })
        .expect("relayed message should surface");
    assert_eq!(received.id, msg_id);
    assert_eq!(received.content, "hello from b");
    assert_eq!(received.handle.as_deref(), Some("bee"));
    assert_eq!(received.direction, Direction::In);

    // B's own echo deduplicates by message id.
    step(&mut b, &mut rx_b).await;
    assert!(drain(&mut ups_b).is_empty());
    assert_eq!(b.history().unwrap().len(), 1);

    // And the reply goes the other way.
    a.send_message("hi back").await.unwrap();
    step(&mut a, &mut rx_a).await;
    step(&mut b, &mut rx_b).await;
    assert_eq!(a.history().unwrap().len(), 2);
    assert_eq!(b.history().unwrap().len(), 2);
    drain(&mut ups_a);
    drain(&mut ups_b);

    // Both heartbeat inside the window: two live participants.
    b.heartbeat().await.unwrap();
    a.heartbeat().await.unwrap();
    assert!(drain(&mut ups_a)
        .iter()
        .any(|u| matches!(u, SessionUpdate::ActiveParticipants(2))));

    // A disbands: both sessions end up destroyed and tokenless.
    a.disband().await.unwrap();
    assert_eq!(a.phase(), RoomPhase::Destroyed);
    step(&mut b, &mut rx_b).await;
    assert_eq!(b.phase(), RoomPhase::Destroyed);
    assert!(b.token().is_none());
    assert!(drain(&mut ups_b)
        .iter()
        .any(|u| matches!(u, SessionUpdate::PhaseChanged(RoomPhase::Destroyed))));

    assert!(matches!(
        b.send_message("too late").await,
        Err(ClientError::NotParticipant)
    ));
}

#[tokio::test]
async fn rejection_notifies_the_knocker() {
    let (base, bus) = spawn_broker().await;
    let dir = tempfile::tempdir().unwrap();
    let secret = RoomSecret::generate();
    let api = RoomApi::new(&base);

    let (mut a, _ups_a) = open_session(&api, open_db(&dir, "a"), &secret).await;
    let topic = a.room_hash().topic();
    let mut rx_a = bus.subscribe(&topic);
    let mut rx_b = bus.subscribe(&topic);

    let (mut b, mut ups_b) = open_session(&api, open_db(&dir, "b"), &secret).await;
    assert_eq!(b.phase(), RoomPhase::LobbyWaiting);
    drain(&mut ups_b);

    b.knock(None).await.unwrap();
    step(&mut a, &mut rx_a).await;
    step(&mut b, &mut rx_b).await;

    a.reject(Some("not now")).await.unwrap();
    step(&mut a, &mut rx_a).await;
    step(&mut b, &mut rx_b).await;

    // Rejection is advice, not state: B may knock again later.
    assert_eq!(b.phase(), RoomPhase::LobbyWaiting);
    assert!(drain(&mut ups_b).iter().any(|u| matches!(
        u,
        SessionUpdate::KnockRejected { message: Some(m) } if m == "not now"
    )));
}

#[tokio::test]
async fn membership_survives_reopen() {
    let (base, _bus) = spawn_broker().await;
    let dir = tempfile::tempdir().unwrap();
    let secret = RoomSecret::generate();
    let api = RoomApi::new(&base);

    let (session, _updates) = open_session(&api, open_db(&dir, "a"), &secret).await;
    let token = session.token().unwrap().to_string();
    drop(session);

    // Same local store, same secret: the stored token short-circuits the
    // lobby entirely.
    let (session, _updates) = open_session(&api, open_db(&dir, "a"), &secret).await;
    assert_eq!(session.phase(), RoomPhase::Participant);
    assert_eq!(session.token(), Some(token.as_str()));
}

#[tokio::test]
async fn drive_loop_applies_events_and_keeps_actions_available() {
    let (base, bus) = spawn_broker().await;
    let dir = tempfile::tempdir().unwrap();
    let secret = RoomSecret::generate();
    let api = RoomApi::new(&base);

    let (mut a, mut ups_a) = open_session(&api, open_db(&dir, "a"), &secret).await;
    let topic = a.room_hash().topic();
    let mut rx_a = bus.subscribe(&topic);

    // B's subscription flows through a transport task into the loop.
    let mut sub_b = bus.subscribe(&topic);
    let (tx, events_b) = mpsc::channel(16);
    tokio::spawn(async move {
        while let Ok(event) = sub_b.recv().await {
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });

    let (b, mut ups_b) = open_session(&api, open_db(&dir, "b"), &secret).await;
    assert_eq!(b.phase(), RoomPhase::LobbyWaiting);
    let b = Arc::new(Mutex::new(b));
    let driver = tokio::spawn(drive(Arc::clone(&b), events_b));

    // Actions go through the shared handle while the loop is running.
    b.lock().await.knock(None).await.unwrap();
    step(&mut a, &mut rx_a).await;
    a.approve().await.unwrap();
    step(&mut a, &mut rx_a).await;

    // The loop applies the approve event on its own.
    wait_for_phase(&b, RoomPhase::Participant).await;

    b.lock().await.send_message("sent mid-loop").await.unwrap();
    step(&mut a, &mut rx_a).await;
    assert!(drain(&mut ups_a).iter().any(|u| matches!(
        u,
        SessionUpdate::Message(m) if m.content == "sent mid-loop"
    )));

    // Disband ends the loop; B observes the destroy through it.
    a.disband().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), driver)
        .await
        .expect("drive loop should finish after destroy")
        .unwrap();
    assert_eq!(b.lock().await.phase(), RoomPhase::Destroyed);
    assert!(drain(&mut ups_b)
        .iter()
        .any(|u| matches!(u, SessionUpdate::PhaseChanged(RoomPhase::Destroyed))));
}

#[tokio::test]
async fn blank_message_rejected_and_blank_handle_clears() {
    let (base, _bus) = spawn_broker().await;
    let dir = tempfile::tempdir().unwrap();
    let api = RoomApi::new(&base);

    let (mut a, mut ups_a) =
        open_session(&api, open_db(&dir, "a"), &RoomSecret::generate()).await;
    drain(&mut ups_a);

    assert!(matches!(
        a.send_message("   ").await,
        Err(ClientError::EmptyMessage)
    ));
    assert!(a.history().unwrap().is_empty());

    a.set_handle("ana").unwrap();
    a.send_message("first").await.unwrap();
    let first = drain(&mut ups_a)
        .into_iter()
        .find_map(|u| match u {
            SessionUpdate::Message(m) => Some(m),
            _ => None,
        })
        .unwrap();
    assert_eq!(first.handle.as_deref(), Some("ana"));

    // A blank handle clears the stored one instead of keeping it.
    a.set_handle("   ").unwrap();
    a.send_message("second").await.unwrap();
    let second = drain(&mut ups_a)
        .into_iter()
        .find_map(|u| match u {
            SessionUpdate::Message(m) => Some(m),
            _ => None,
        })
        .unwrap();
    assert_eq!(second.handle, None);
}

#[tokio::test]
async fn events_for_other_rooms_are_ignored() {
    let (base, _bus) = spawn_broker().await;
    let dir = tempfile::tempdir().unwrap();
    let api = RoomApi::new(&base);

    let (mut session, mut updates) =
        open_session(&api, open_db(&dir, "a"), &RoomSecret::generate()).await;
    drain(&mut updates);

    let foreign = RoomEvent::new(
        derive_room_hash(&RoomSecret::generate()).as_str().to_string(),
        None,
        1,
        EventBody::Destroy {},
    );
    session.handle_event(foreign).unwrap();

    assert_eq!(session.phase(), RoomPhase::Participant);
    assert!(drain(&mut updates).is_empty());
}
