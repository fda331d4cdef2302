//! Shared harness for the TCP integration tests: an in-process server on an
//! ephemeral port and a framed-JSON test client speaking the wire protocol.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use gomoku_server::protocol::codec::{decode_server_message, encode_message, frame_codec};
use gomoku_server::protocol::messages::{ClientMessage, ServerMessage};
use gomoku_server::server::listener::Listener;
use gomoku_server::server::registry::Registry;
use gomoku_server::ServerConfig;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Bind a fresh server on an ephemeral port and run it in the background.
pub async fn start_server() -> SocketAddr {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
    };
    let listener = Listener::bind(&config).await.expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let registry = Registry::new();
    tokio::spawn(async move {
        let _ = listener.run(registry).await;
    });
    addr
}

pub struct TestClient {
    reader: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
    writer: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
    stash: VecDeque<ServerMessage>,
    pub session_id: String,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read_half, write_half) = stream.into_split();
        let mut client = Self {
            reader: FramedRead::new(read_half, frame_codec()),
            writer: FramedWrite::new(write_half, frame_codec()),
            stash: VecDeque::new(),
            session_id: String::new(),
        };
        let welcome = client.recv_raw().await;
        match welcome {
            ServerMessage::Welcome { session_id } => client.session_id = session_id,
            other => panic!("expected welcome, got {other:?}"),
        }
        client
    }

    pub async fn send(&mut self, message: &ClientMessage) {
        let frame = encode_message(message).expect("encode");
        self.writer.send(frame).await.expect("send frame");
    }

    async fn recv_raw(&mut self) -> ServerMessage {
        let frame = tokio::time::timeout(RECV_TIMEOUT, self.reader.next())
            .await
            .expect("timed out waiting for a server message")
            .expect("connection closed")
            .expect("frame error");
        decode_server_message(&frame).expect("decode server message")
    }

    /// Next message matching `pred`, searching already-received messages
    /// first. Non-matching arrivals are kept for later expectations.
    pub async fn expect(&mut self, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
        if let Some(pos) = self.stash.iter().position(&pred) {
            return self.stash.remove(pos).unwrap();
        }
        loop {
            let message = self.recv_raw().await;
            if pred(&message) {
                return message;
            }
            self.stash.push_back(message);
        }
    }

    /// Assert that no message matching `pred` is pending or arrives within
    /// `window`. Non-matching arrivals are kept.
    pub async fn assert_silent(
        &mut self,
        window: Duration,
        pred: impl Fn(&ServerMessage) -> bool,
    ) {
        if let Some(found) = self.stash.iter().find(|message| pred(message)) {
            panic!("unexpected message already received: {found:?}");
        }
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return;
            }
            match tokio::time::timeout(remaining, self.reader.next()).await {
                Err(_) => return,
                Ok(None) => return,
                Ok(Some(frame)) => {
                    let message = decode_server_message(&frame.expect("frame error"))
                        .expect("decode server message");
                    if pred(&message) {
                        panic!("unexpected message within silence window: {message:?}");
                    }
                    self.stash.push_back(message);
                }
            }
        }
    }
}

/// Create a room and return its id from the resulting listing broadcast.
pub async fn create_room(client: &mut TestClient, name: &str) -> u32 {
    client
        .send(&ClientMessage::CreateRoom {
            name: name.to_string(),
        })
        .await;
    let listing = client
        .expect(|m| matches!(m, ServerMessage::RoomList { rooms } if !rooms.is_empty()))
        .await;
    match listing {
        ServerMessage::RoomList { rooms } => rooms[0].room_id,
        _ => unreachable!(),
    }
}

/// Wait for the start signal and acknowledge local setup.
pub async fn ready_up(client: &mut TestClient) {
    client
        .expect(|m| matches!(m, ServerMessage::StartSignal))
        .await;
    client.send(&ClientMessage::FinishedInitializing).await;
}

/// Ask the server which color this client holds. `None` means spectator.
pub async fn color_of(
    client: &mut TestClient,
) -> Option<gomoku_server::domain::StoneColor> {
    client.send(&ClientMessage::GetColor).await;
    match client
        .expect(|m| matches!(m, ServerMessage::Color { .. }))
        .await
    {
        ServerMessage::Color { color } => color,
        _ => unreachable!(),
    }
}

/// Stand up a two-player room with the given settings and run the start
/// handshake. Returns `(black, white, room_id)`.
pub async fn setup_match(
    addr: SocketAddr,
    board_size: usize,
    turn_timer_ms: u64,
) -> (TestClient, TestClient, u32) {
    let mut creator = TestClient::connect(addr).await;
    let mut joiner = TestClient::connect(addr).await;

    let room_id = create_room(&mut creator, "match room").await;
    if board_size != 0 {
        creator
            .send(&ClientMessage::SetBoardSize { size: board_size })
            .await;
    }
    if turn_timer_ms != 0 {
        creator
            .send(&ClientMessage::SetTurnTimer {
                millis: turn_timer_ms,
            })
            .await;
    }
    joiner.send(&ClientMessage::JoinRoom { room_id }).await;
    joiner
        .expect(|m| matches!(m, ServerMessage::RoomSettings(_)))
        .await;

    creator.send(&ClientMessage::StartMatch).await;
    // The start barrier is sequential, so both clients acknowledge
    // concurrently and the server controls the ordering.
    tokio::join!(ready_up(&mut creator), ready_up(&mut joiner));

    let creator_color = color_of(&mut creator).await.expect("creator is seated");
    if creator_color == gomoku_server::domain::StoneColor::Black {
        (creator, joiner, room_id)
    } else {
        (joiner, creator, room_id)
    }
}
