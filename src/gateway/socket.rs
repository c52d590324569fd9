use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::Extension;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::error::SessionError;
use crate::gateway::bus::{Audience, EventBus};
use crate::gateway::events::{
    ActivePollSnapshot, ChatHistory, ClientEvent, PollResult, RoleSelection, ServerEvent,
};
use crate::hub::SessionHub;
use crate::startup::AppState;

/// How much chat history a client gets when it asks.
const CHAT_REPLAY_LIMIT: usize = 100;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(app_state): Extension<AppState>,
    Extension(bus): Extension<Arc<EventBus>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection_loop(socket, app_state.hub, bus))
}

/// What this connection has asked to hear. Subscription is separate from
/// room membership: a kicked member keeps receiving room events until it
/// disconnects or leaves on its own.
struct Subscriptions {
    rooms: HashSet<Uuid>,
    global_chat: bool,
}

impl Subscriptions {
    fn new() -> Self {
        Subscriptions {
            rooms: HashSet::new(),
            global_chat: false,
        }
    }

    fn wants(&self, audience: &Audience, connection_id: &str) -> bool {
        match audience {
            Audience::All => true,
            Audience::Room(poll_id) => self.rooms.contains(poll_id),
            Audience::GlobalChat => self.global_chat,
            Audience::Connection(id) => id == connection_id,
        }
    }
}

/// One task per connection: inbound frames are dispatched against the hub,
/// bus envelopes are filtered locally and relayed out. Dropping the task
/// drops the bus subscription with it.
async fn connection_loop(mut socket: WebSocket, hub: Arc<SessionHub>, bus: Arc<EventBus>) {
    let connection_id = Uuid::new_v4().to_string();
    let mut bus_rx = bus.subscribe();
    let mut subs = Subscriptions::new();
    info!("connection {connection_id} established");

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => {
                                let reply =
                                    dispatch(event, &connection_id, &hub, &bus, &mut subs).await;
                                if let Some(reply) = reply {
                                    if send_event(&mut socket, &reply).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(error) => {
                                warn!("connection {connection_id} sent an unreadable frame: {error}");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        warn!("connection {connection_id} transport error: {error}");
                        break;
                    }
                }
            }
            published = bus_rx.recv() => {
                match published {
                    Ok(envelope) => {
                        if subs.wants(&envelope.audience, &connection_id)
                            && send_event(&mut socket, &envelope.event).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("connection {connection_id} lagged, dropped {missed} updates");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    for (poll_id, roster) in hub.disconnect(&connection_id).await {
        bus.publish(
            Audience::Room(poll_id),
            ServerEvent::ParticipantsUpdated(roster),
        );
    }
    info!("connection {connection_id} closed");
}

/// Runs one inbound event against the hub. Broadcasts go out through the
/// bus here; the returned event, if any, is the direct reply for the
/// initiating connection and is sent before any broadcast reaches it.
async fn dispatch(
    event: ClientEvent,
    connection_id: &str,
    hub: &SessionHub,
    bus: &EventBus,
    subs: &mut Subscriptions,
) -> Option<ServerEvent> {
    match event {
        ClientEvent::SelectRoles { roles, user_name } => {
            match hub
                .select_roles(connection_id, roles, user_name.as_deref())
                .await
            {
                Ok(record) => Some(ServerEvent::RolesSelected(RoleSelection::ok(record.roles))),
                Err(error) => {
                    warn!("connection {connection_id} role selection failed: {error}");
                    Some(ServerEvent::RolesSelected(RoleSelection::failed(
                        error.to_string(),
                    )))
                }
            }
        }

        ClientEvent::CreatePoll {
            question,
            options,
            time_limit,
        } => {
            match hub
                .create_poll(connection_id, question, options, time_limit)
                .await
            {
                Ok(poll) => {
                    bus.publish(Audience::All, ServerEvent::NewPoll(poll.clone()));
                    Some(ServerEvent::PollCreated(PollResult::ok(poll)))
                }
                Err(error) => {
                    warn!("connection {connection_id} poll creation failed: {error}");
                    Some(ServerEvent::PollCreated(PollResult::failed(
                        error.to_string(),
                    )))
                }
            }
        }

        ClientEvent::SubmitVote {
            poll_id,
            option,
            user_name,
            user_id,
        } => {
            let Some(poll_id) = poll_id else {
                warn!("connection {connection_id} vote carried no poll id");
                return Some(ServerEvent::VoteSubmitted(PollResult::failed(
                    SessionError::PollNotFound.to_string(),
                )));
            };
            match hub
                .submit_vote(
                    connection_id,
                    poll_id,
                    &option,
                    user_name.as_deref(),
                    user_id.as_deref(),
                )
                .await
            {
                Ok(poll) => {
                    bus.publish(Audience::All, ServerEvent::PollUpdated(poll.clone()));
                    Some(ServerEvent::VoteSubmitted(PollResult::ok(poll)))
                }
                Err(error) => {
                    warn!("connection {connection_id} vote failed: {error}");
                    Some(ServerEvent::VoteSubmitted(PollResult::failed(
                        error.to_string(),
                    )))
                }
            }
        }

        ClientEvent::GetActivePoll => {
            let snapshot = match hub.active_poll(connection_id).await {
                Some((poll, remaining_time, has_voted)) => {
                    ActivePollSnapshot::running(poll, remaining_time, has_voted)
                }
                None => ActivePollSnapshot::idle(),
            };
            Some(ServerEvent::ActivePoll(snapshot))
        }

        ClientEvent::JoinPollRoom { poll_id, user_name } => {
            let Some(poll_id) = poll_id else {
                return Some(ServerEvent::Error {
                    message: "Poll ID is required".to_string(),
                });
            };
            match hub
                .join_room(connection_id, poll_id, user_name.as_deref())
                .await
            {
                Ok(roster) => {
                    subs.rooms.insert(poll_id);
                    subs.global_chat = true;
                    bus.publish(
                        Audience::Room(poll_id),
                        ServerEvent::ParticipantsUpdated(roster),
                    );
                    None
                }
                Err(error) => Some(error_event(connection_id, &error)),
            }
        }

        ClientEvent::LeavePollRoom { poll_id } => {
            let Some(poll_id) = poll_id else {
                return None;
            };
            subs.rooms.remove(&poll_id);
            if let Some(roster) = hub.leave_room(connection_id, poll_id).await {
                bus.publish(
                    Audience::Room(poll_id),
                    ServerEvent::ParticipantsUpdated(roster),
                );
            }
            None
        }

        ClientEvent::JoinPoll { poll_id } => {
            if let Some(poll_id) = poll_id {
                subs.rooms.insert(poll_id);
            }
            None
        }

        ClientEvent::SendChatMessage { message, user_name } => {
            if message.trim().is_empty() {
                return Some(ServerEvent::Error {
                    message: "Failed to send message".to_string(),
                });
            }
            match hub
                .send_chat(connection_id, user_name.as_deref(), message)
                .await
            {
                Ok(stored) => {
                    bus.publish(Audience::GlobalChat, ServerEvent::ChatMessage(stored));
                    None
                }
                Err(error) => {
                    warn!("chat message from {connection_id} rejected: {error}");
                    Some(ServerEvent::Error {
                        message: "Failed to send message".to_string(),
                    })
                }
            }
        }

        ClientEvent::GetChatMessages => {
            let messages = hub.chat_messages(CHAT_REPLAY_LIMIT).await;
            Some(ServerEvent::ChatHistory(ChatHistory {
                success: true,
                messages,
            }))
        }

        ClientEvent::KickUser { poll_id, socket_id } => {
            let (Some(poll_id), Some(target)) = (poll_id, socket_id) else {
                return None;
            };
            match hub.kick(connection_id, poll_id, &target).await {
                Ok(removed) => {
                    bus.publish(
                        Audience::Connection(target),
                        ServerEvent::UserKicked { poll_id },
                    );
                    if let Some(roster) = removed {
                        bus.publish(
                            Audience::Room(poll_id),
                            ServerEvent::ParticipantsUpdated(roster),
                        );
                    }
                    None
                }
                Err(error) => Some(error_event(connection_id, &error)),
            }
        }

        ClientEvent::GetPollHistory => Some(ServerEvent::PollHistory(hub.poll_history().await)),
    }
}

fn error_event(connection_id: &str, error: &SessionError) -> ServerEvent {
    warn!("connection {connection_id} request failed: {error}");
    ServerEvent::Error {
        message: error.to_string(),
    }
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(frame) => socket.send(Message::Text(frame)).await,
        Err(error) => {
            error!("failed to encode outbound event: {error}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::MemoryStore;
    use crate::users::Role;
    use tokio::sync::broadcast::Receiver;

    fn fixtures() -> (SessionHub, EventBus, Subscriptions) {
        let hub = SessionHub::new(Arc::new(MemoryStore::new()));
        let bus = EventBus::new();
        (hub, bus, Subscriptions::new())
    }

    async fn make_teacher(hub: &SessionHub, connection_id: &str) {
        hub.select_roles(connection_id, vec![Role::Teacher], Some("Ms. Reed"))
            .await
            .unwrap();
    }

    fn drain_one(rx: &mut Receiver<Arc<crate::gateway::bus::Envelope>>) -> crate::gateway::bus::Envelope {
        (*rx.try_recv().expect("an envelope was published")).clone()
    }

    #[test]
    fn subscriptions_filter_by_audience() {
        let mut subs = Subscriptions::new();
        let room = Uuid::new_v4();

        assert!(subs.wants(&Audience::All, "c1"));
        assert!(!subs.wants(&Audience::Room(room), "c1"));
        assert!(!subs.wants(&Audience::GlobalChat, "c1"));
        assert!(subs.wants(&Audience::Connection("c1".to_string()), "c1"));
        assert!(!subs.wants(&Audience::Connection("c2".to_string()), "c1"));

        subs.rooms.insert(room);
        subs.global_chat = true;
        assert!(subs.wants(&Audience::Room(room), "c1"));
        assert!(!subs.wants(&Audience::Room(Uuid::new_v4()), "c1"));
        assert!(subs.wants(&Audience::GlobalChat, "c1"));
    }

    #[tokio::test]
    async fn poll_creation_replies_and_broadcasts() {
        let (hub, bus, mut subs) = fixtures();
        let mut rx = bus.subscribe();
        make_teacher(&hub, "t1").await;

        let reply = dispatch(
            ClientEvent::CreatePoll {
                question: "Color?".to_string(),
                options: vec![],
                time_limit: Some(30),
            },
            "t1",
            &hub,
            &bus,
            &mut subs,
        )
        .await;

        assert!(matches!(
            reply,
            Some(ServerEvent::PollCreated(PollResult { success: true, .. }))
        ));
        let envelope = drain_one(&mut rx);
        assert_eq!(envelope.audience, Audience::All);
        assert!(matches!(envelope.event, ServerEvent::NewPoll(_)));
    }

    #[tokio::test]
    async fn unauthorized_creation_reports_only_to_the_caller() {
        let (hub, bus, mut subs) = fixtures();
        let mut rx = bus.subscribe();

        let reply = dispatch(
            ClientEvent::CreatePoll {
                question: "Color?".to_string(),
                options: vec![],
                time_limit: None,
            },
            "s1",
            &hub,
            &bus,
            &mut subs,
        )
        .await;

        match reply {
            Some(ServerEvent::PollCreated(result)) => {
                assert!(!result.success);
                assert!(result.poll.is_none());
                assert_eq!(result.error.as_deref(), Some("Only teachers can create polls"));
            }
            other => panic!("expected a failed creation reply, got {other:?}"),
        }
        assert!(rx.try_recv().is_err(), "failures must not broadcast");
    }

    #[tokio::test]
    async fn joining_subscribes_and_updates_the_room() {
        let (hub, bus, mut subs) = fixtures();
        let mut rx = bus.subscribe();
        make_teacher(&hub, "t1").await;
        let poll = hub
            .create_poll("t1", "Q?".to_string(), vec![], None)
            .await
            .unwrap();

        let reply = dispatch(
            ClientEvent::JoinPollRoom {
                poll_id: Some(poll.id),
                user_name: Some("Ana".to_string()),
            },
            "s1",
            &hub,
            &bus,
            &mut subs,
        )
        .await;

        assert!(reply.is_none());
        assert!(subs.rooms.contains(&poll.id));
        assert!(subs.global_chat);

        let envelope = drain_one(&mut rx);
        assert_eq!(envelope.audience, Audience::Room(poll.id));
        match envelope.event {
            ServerEvent::ParticipantsUpdated(roster) => {
                assert_eq!(roster.len(), 1);
                assert_eq!(roster[0].user_name, "Ana");
            }
            other => panic!("expected a roster event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn joining_without_a_poll_id_is_an_error() {
        let (hub, bus, mut subs) = fixtures();

        let reply = dispatch(
            ClientEvent::JoinPollRoom {
                poll_id: None,
                user_name: None,
            },
            "s1",
            &hub,
            &bus,
            &mut subs,
        )
        .await;

        match reply {
            Some(ServerEvent::Error { message }) => assert_eq!(message, "Poll ID is required"),
            other => panic!("expected an error event, got {other:?}"),
        }
        assert!(subs.rooms.is_empty());
    }

    #[tokio::test]
    async fn kick_notifies_the_target_then_the_room() {
        let (hub, bus, mut subs) = fixtures();
        make_teacher(&hub, "t1").await;
        let poll = hub
            .create_poll("t1", "Q?".to_string(), vec![], None)
            .await
            .unwrap();
        hub.join_room("s1", poll.id, Some("Ana")).await.unwrap();
        let mut rx = bus.subscribe();

        let reply = dispatch(
            ClientEvent::KickUser {
                poll_id: Some(poll.id),
                socket_id: Some("s1".to_string()),
            },
            "t1",
            &hub,
            &bus,
            &mut subs,
        )
        .await;

        assert!(reply.is_none());
        let first = drain_one(&mut rx);
        assert_eq!(first.audience, Audience::Connection("s1".to_string()));
        assert!(matches!(first.event, ServerEvent::UserKicked { .. }));

        let second = drain_one(&mut rx);
        assert_eq!(second.audience, Audience::Room(poll.id));
        assert!(matches!(
            second.event,
            ServerEvent::ParticipantsUpdated(ref roster) if roster.is_empty()
        ));
    }

    #[tokio::test]
    async fn kicking_an_absent_target_skips_the_roster_broadcast() {
        let (hub, bus, mut subs) = fixtures();
        make_teacher(&hub, "t1").await;
        let poll = hub
            .create_poll("t1", "Q?".to_string(), vec![], None)
            .await
            .unwrap();
        let mut rx = bus.subscribe();

        dispatch(
            ClientEvent::KickUser {
                poll_id: Some(poll.id),
                socket_id: Some("ghost".to_string()),
            },
            "t1",
            &hub,
            &bus,
            &mut subs,
        )
        .await;

        assert!(matches!(
            drain_one(&mut rx).event,
            ServerEvent::UserKicked { .. }
        ));
        assert!(rx.try_recv().is_err(), "no roster change to announce");
    }

    #[tokio::test]
    async fn empty_chat_messages_are_refused() {
        let (hub, bus, mut subs) = fixtures();
        let mut rx = bus.subscribe();

        let reply = dispatch(
            ClientEvent::SendChatMessage {
                message: "   ".to_string(),
                user_name: Some("Ana".to_string()),
            },
            "s1",
            &hub,
            &bus,
            &mut subs,
        )
        .await;

        match reply {
            Some(ServerEvent::Error { message }) => {
                assert_eq!(message, "Failed to send message");
            }
            other => panic!("expected an error event, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn chat_broadcasts_to_the_global_channel() {
        let (hub, bus, mut subs) = fixtures();
        let mut rx = bus.subscribe();

        let reply = dispatch(
            ClientEvent::SendChatMessage {
                message: "hello".to_string(),
                user_name: Some("Ana".to_string()),
            },
            "s1",
            &hub,
            &bus,
            &mut subs,
        )
        .await;

        assert!(reply.is_none());
        let envelope = drain_one(&mut rx);
        assert_eq!(envelope.audience, Audience::GlobalChat);
        assert!(matches!(envelope.event, ServerEvent::ChatMessage(_)));
    }

    #[tokio::test]
    async fn vote_without_a_poll_id_reads_as_not_found() {
        let (hub, bus, mut subs) = fixtures();

        let reply = dispatch(
            ClientEvent::SubmitVote {
                poll_id: None,
                option: "Red".to_string(),
                user_name: None,
                user_id: None,
            },
            "s1",
            &hub,
            &bus,
            &mut subs,
        )
        .await;

        match reply {
            Some(ServerEvent::VoteSubmitted(result)) => {
                assert!(!result.success);
                assert_eq!(result.error.as_deref(), Some("Poll not found"));
            }
            other => panic!("expected a failed vote reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn snapshot_reports_idle_when_nothing_runs() {
        let (hub, bus, mut subs) = fixtures();

        let reply = dispatch(ClientEvent::GetActivePoll, "s1", &hub, &bus, &mut subs).await;

        match reply {
            Some(ServerEvent::ActivePoll(snapshot)) => {
                assert!(!snapshot.success);
                assert!(snapshot.poll.is_none());
            }
            other => panic!("expected a snapshot, got {other:?}"),
        }
    }
}
