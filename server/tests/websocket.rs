//! Ende-zu-Ende-Tests ueber einen echten WebSocket-Listener

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sprintwerk_core::UserId;
use sprintwerk_protocol::{wire::stapel_zerlegen, Envelope, NachrichtenTyp};
use sprintwerk_server::{config::ServerConfig, Server};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const WARTEZEIT: Duration = Duration::from_secs(5);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn server_starten(config: ServerConfig) -> (Server, SocketAddr) {
    let server = Server::neu(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server.app();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (server, addr)
}

async fn verbinden(addr: SocketAddr, user: Option<&'static str>) -> Result<Socket, WsError> {
    let mut request = format!("ws://{addr}/ws").into_client_request()?;
    if let Some(user) = user {
        request
            .headers_mut()
            .insert("x-user-id", HeaderValue::from_static(user));
    }
    connect_async(request).await.map(|(socket, _)| socket)
}

fn http_status(ergebnis: Result<Socket, WsError>) -> StatusCode {
    match ergebnis {
        Err(WsError::Http(antwort)) => antwort.status(),
        Err(e) => panic!("Unerwarteter Fehler: {e}"),
        Ok(_) => panic!("Upgrade haette abgelehnt werden muessen"),
    }
}

struct TestClient {
    socket: Socket,
    puffer: VecDeque<Envelope>,
    gesehen: Vec<NachrichtenTyp>,
}

impl TestClient {
    async fn neu(addr: SocketAddr, user: &'static str) -> Self {
        let socket = verbinden(addr, Some(user)).await.unwrap();
        let mut client = Self {
            socket,
            puffer: VecDeque::new(),
            gesehen: Vec::new(),
        };
        // Ping-Pong stellt sicher, dass die Verbindung im Hub registriert ist
        client.senden(r#"{"action":"ping"}"#).await;
        client.naechstes(NachrichtenTyp::Pong).await;
        client.gesehen.clear();
        client
    }

    async fn senden(&mut self, text: &str) {
        self.socket.send(Message::Text(text.to_string())).await.unwrap();
    }

    async fn beitreten(&mut self, raum: &str) {
        self.senden(&format!(r#"{{"action":"join","room":"{raum}"}}"#)).await;
        let ack = self.naechstes(NachrichtenTyp::Ack).await;
        assert_eq!(ack.payload["room"], raum);
    }

    async fn naechstes(&mut self, typ: NachrichtenTyp) -> Envelope {
        loop {
            while let Some(envelope) = self.puffer.pop_front() {
                if envelope.typ == typ {
                    return envelope;
                }
                self.gesehen.push(envelope.typ);
            }

            let frame = timeout(WARTEZEIT, self.socket.next())
                .await
                .unwrap_or_else(|_| panic!("Kein {typ} innerhalb der Wartezeit"))
                .expect("Verbindung beendet")
                .unwrap();
            if let Message::Text(text) = frame {
                for zeile in stapel_zerlegen(&text) {
                    self.puffer.push_back(Envelope::from_json(zeile).unwrap());
                }
            }
        }
    }

    /// Liest bis zum Close-Frame und liefert dessen Code
    async fn close_code(&mut self) -> Option<CloseCode> {
        loop {
            let frame = timeout(WARTEZEIT, self.socket.next())
                .await
                .expect("Kein Close-Frame erhalten")
                .expect("Verbindung ohne Close-Frame beendet")
                .expect("Verbindung ohne Close-Frame abgebrochen");
            if let Message::Close(frame) = frame {
                return frame.map(|f| f.code);
            }
        }
    }
}

#[tokio::test]
async fn upgrade_ohne_identitaet_wird_abgelehnt() {
    let (_server, addr) = server_starten(ServerConfig::default()).await;
    assert_eq!(http_status(verbinden(addr, None).await), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn volles_verbindungslimit_liefert_503() {
    let mut config = ServerConfig::default();
    config.server.max_verbindungen = 1;
    let (_server, addr) = server_starten(config).await;

    let _erster = TestClient::neu(addr, "u1").await;
    assert_eq!(
        http_status(verbinden(addr, Some("u2")).await),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn task_event_erreicht_andere_projektmitglieder() {
    let (server, addr) = server_starten(ServerConfig::default()).await;
    let mut alice = TestClient::neu(addr, "alice").await;
    let mut bob = TestClient::neu(addr, "bob").await;
    alice.beitreten("project:7").await;
    bob.beitreten("project:7").await;

    let empfaenger = server.broadcaster().task_erstellt(
        "7",
        &serde_json::json!({ "id": "t-1", "title": "Login-Seite" }),
        &UserId::from("alice"),
    );
    assert_eq!(empfaenger, 1);

    let event = bob.naechstes(NachrichtenTyp::TaskCreated).await;
    assert_eq!(event.payload["id"], "t-1");

    // Alice bekommt ihr eigenes Event nicht zurueck
    alice.senden(r#"{"action":"ping"}"#).await;
    alice.naechstes(NachrichtenTyp::Pong).await;
    assert!(!alice.gesehen.contains(&NachrichtenTyp::TaskCreated));
}

#[tokio::test]
async fn shutdown_schliesst_verbindung_sauber() {
    let (server, addr) = server_starten(ServerConfig::default()).await;
    let mut client = TestClient::neu(addr, "u1").await;

    assert_eq!(server.hub().alle_trennen(), 1);

    assert_eq!(client.close_code().await, Some(CloseCode::Normal));
    assert!(!server.hub().ist_online(&UserId::from("u1")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_endet_erst_nach_close_frames() {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    std_listener.set_nonblocking(true).unwrap();
    let addr = std_listener.local_addr().unwrap();
    let (signal_tx, signal_rx) = oneshot::channel::<()>();

    // Eigene Runtime wie im Binary: sie wird direkt nach starten_mit verworfen
    let server_thread = std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let ergebnis = runtime.block_on(async move {
            let mut config = ServerConfig::default();
            config.observability.aktiviert = false;
            let listener = TcpListener::from_std(std_listener).unwrap();
            Server::neu(config)
                .unwrap()
                .starten_mit(listener, async {
                    let _ = signal_rx.await;
                })
                .await
        });
        drop(runtime);
        ergebnis
    });

    let mut clients = Vec::new();
    for user in ["u1", "u2", "u3"] {
        clients.push(TestClient::neu(addr, user).await);
    }

    signal_tx.send(()).unwrap();
    tokio::task::spawn_blocking(move || server_thread.join())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    for client in &mut clients {
        assert_eq!(client.close_code().await, Some(CloseCode::Normal));
    }
}
