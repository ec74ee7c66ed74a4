//! Ende-zu-Ende-Szenarien: echte Read-/Write-Pumps ueber In-Memory-Streams

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use serde_json::json;
use sprintwerk_core::{Raum, UserId, VerbindungsId};
use sprintwerk_protocol::envelope::payload_aus;
use sprintwerk_protocol::wire::stapel_zerlegen;
use sprintwerk_protocol::{Aktion, Envelope, NachrichtenTyp, Steuerframe};
use sprintwerk_realtime::{ClientConnection, Hub, PresenceEvent, RealtimeConfig, StandardZugriff};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::PollSender;

const WARTEZEIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Test-Client
// ---------------------------------------------------------------------------

struct TestClient {
    eingang: Option<mpsc::Sender<Result<Message, Infallible>>>,
    ausgang: mpsc::Receiver<Message>,
    task: JoinHandle<VerbindungsId>,
    /// Noch nicht abgeholte Envelopes aus bereits gelesenen Frames
    puffer: VecDeque<Envelope>,
    /// Alle Envelopes die `naechstes` uebersprungen hat
    gesehen: Vec<Envelope>,
}

fn verbinden(hub: &Arc<Hub>, user: &str) -> TestClient {
    let (eingang_tx, eingang_rx) = mpsc::channel(16);
    let (ausgang_tx, ausgang_rx) = mpsc::channel(64);

    let verbindung = ClientConnection::neu(Arc::clone(hub), Arc::new(StandardZugriff));
    let task = tokio::spawn(verbindung.verarbeiten(
        UserId::from(user),
        ReceiverStream::new(eingang_rx),
        PollSender::new(ausgang_tx),
    ));

    TestClient {
        eingang: Some(eingang_tx),
        ausgang: ausgang_rx,
        task,
        puffer: VecDeque::new(),
        gesehen: Vec::new(),
    }
}

impl TestClient {
    async fn text_senden(&self, text: String) {
        self.eingang
            .as_ref()
            .expect("Eingang bereits geschlossen")
            .send(Ok(Message::Text(text)))
            .await
            .expect("Read-Pump beendet");
    }

    async fn senden(&self, aktion: Aktion, raum: Option<&str>) {
        let frame = Steuerframe::neu(aktion, raum).to_json().unwrap();
        self.text_senden(frame).await;
    }

    /// Naechstes Envelope eines Typs, alles andere landet in `gesehen`
    async fn naechstes(&mut self, typ: NachrichtenTyp) -> Envelope {
        loop {
            while let Some(envelope) = self.puffer.pop_front() {
                if envelope.typ == typ {
                    return envelope;
                }
                self.gesehen.push(envelope);
            }

            let frame = timeout(WARTEZEIT, self.ausgang.recv())
                .await
                .unwrap_or_else(|_| panic!("Kein {typ} innerhalb der Wartezeit"))
                .expect("Write-Pump beendet");
            match frame {
                Message::Text(text) => {
                    for zeile in stapel_zerlegen(&text) {
                        self.puffer.push_back(Envelope::from_json(zeile).unwrap());
                    }
                }
                Message::Close(_) => {
                    panic!("Verbindung geschlossen waehrend auf {typ} gewartet wurde")
                }
                _ => {}
            }
        }
    }

    /// Stellt sicher dass die Verbindung registriert ist (ping -> pong)
    async fn bereit(&mut self) {
        self.senden(Aktion::Ping, None).await;
        self.naechstes(NachrichtenTyp::Pong).await;
    }

    async fn beitreten(&mut self, raum: &str) {
        self.senden(Aktion::Join, Some(raum)).await;
        let ack = self.naechstes(NachrichtenTyp::Ack).await;
        assert_eq!(ack.payload["room"], raum);
    }

    /// Client schliesst: Eingang endet, Task muss sauber auslaufen
    async fn schliessen(mut self) -> Vec<Message> {
        self.eingang.take();
        self.auslaufen(WARTEZEIT).await
    }

    /// Wartet auf das Task-Ende und liefert alle restlichen Frames
    async fn auslaufen(mut self, frist: Duration) -> Vec<Message> {
        timeout(frist, &mut self.task)
            .await
            .expect("Verbindungs-Task endet nicht")
            .unwrap();
        let mut rest = Vec::new();
        while let Ok(frame) = self.ausgang.try_recv() {
            rest.push(frame);
        }
        rest
    }
}

fn anzahl_vom_typ(envelopes: &[Envelope], typ: NachrichtenTyp, user: &str) -> usize {
    envelopes
        .iter()
        .filter(|e| e.typ == typ && e.payload["user_id"] == user)
        .count()
}

// ---------------------------------------------------------------------------
// Szenarien
// ---------------------------------------------------------------------------

#[tokio::test]
async fn projekt_raum_ohne_eigenes_echo() {
    let hub = Hub::neu(RealtimeConfig::default());
    let mut a = verbinden(&hub, "u1");
    let mut b = verbinden(&hub, "u2");
    a.beitreten("project:42").await;
    b.beitreten("project:42").await;

    let payload = payload_aus(&json!({"id": "t1", "title": "Login bauen"})).unwrap();
    let anzahl = hub.an_raum_senden(
        &Raum::projekt(42),
        NachrichtenTyp::TaskCreated,
        payload,
        Some(&UserId::from("u1")),
    );
    assert_eq!(anzahl, 1);

    let empfangen = b.naechstes(NachrichtenTyp::TaskCreated).await;
    assert_eq!(empfangen.payload["id"], "t1");

    // Markierung an u1: alles davor muss ohne task_created gewesen sein
    hub.an_user_senden(
        &UserId::from("u1"),
        NachrichtenTyp::NotificationCreated,
        Default::default(),
    );
    a.naechstes(NachrichtenTyp::NotificationCreated).await;
    assert!(a.gesehen.iter().all(|e| e.typ != NachrichtenTyp::TaskCreated));

    a.schliessen().await;
    b.schliessen().await;
    assert_eq!(hub.verbindungs_anzahl(), 0);
}

#[tokio::test]
async fn zwei_tabs_ein_offline_event() {
    let hub = Hub::neu(RealtimeConfig::default());
    let mut events = hub.events_abonnieren();

    let mut beobachter = verbinden(&hub, "u2");
    beobachter.bereit().await;

    let mut c1 = verbinden(&hub, "u1");
    c1.bereit().await;
    let mut c2 = verbinden(&hub, "u1");
    c2.bereit().await;
    assert_eq!(hub.verbindungen_von(&UserId::from("u1")).len(), 2);

    c1.schliessen().await;
    assert!(hub.ist_online(&UserId::from("u1")));
    c2.schliessen().await;
    assert!(!hub.ist_online(&UserId::from("u1")));

    hub.an_user_senden(
        &UserId::from("u2"),
        NachrichtenTyp::NotificationCreated,
        Default::default(),
    );
    beobachter.naechstes(NachrichtenTyp::NotificationCreated).await;
    assert_eq!(anzahl_vom_typ(&beobachter.gesehen, NachrichtenTyp::UserOnline, "u1"), 1);
    assert_eq!(anzahl_vom_typ(&beobachter.gesehen, NachrichtenTyp::UserOffline, "u1"), 1);

    let mut offline = 0;
    while let Ok(event) = events.try_recv() {
        if event
            == (PresenceEvent::UserOffline {
                user_id: UserId::from("u1"),
            })
        {
            offline += 1;
        }
    }
    assert_eq!(offline, 1);

    beobachter.schliessen().await;
}

#[tokio::test]
async fn typing_erreicht_nur_andere_user() {
    let hub = Hub::neu(RealtimeConfig::default());
    let mut a = verbinden(&hub, "u1");
    let mut b = verbinden(&hub, "u2");
    a.beitreten("chat:7").await;
    b.beitreten("chat:7").await;

    a.text_senden(r#"{"action":"typing","room":"chat:7","payload":{"draft":true}}"#.into())
        .await;

    let tippen = b.naechstes(NachrichtenTyp::Typing).await;
    assert_eq!(tippen.payload["user_id"], "u1");
    assert_eq!(tippen.payload["room"], "chat:7");

    a.bereit().await;
    assert!(a.gesehen.iter().all(|e| e.typ != NachrichtenTyp::Typing));
}

#[tokio::test]
async fn kaputter_frame_laesst_verbindung_offen() {
    let hub = Hub::neu(RealtimeConfig::default());
    let mut client = verbinden(&hub, "u1");

    client.text_senden("{\"action\":\"explode\"}".into()).await;
    let fehler = client.naechstes(NachrichtenTyp::Error).await;
    assert_eq!(fehler.payload["code"], "INVALID_REQUEST");

    client.bereit().await;
    assert_eq!(hub.verbindungs_anzahl(), 1);
}

// ---------------------------------------------------------------------------
// Pumps
// ---------------------------------------------------------------------------

#[tokio::test]
async fn wartende_envelopes_werden_zusammengefasst() {
    let hub = Hub::neu(RealtimeConfig::default());
    let mut client = verbinden(&hub, "u1");
    let u1 = UserId::from("u1");
    while !hub.ist_online(&u1) {
        tokio::task::yield_now().await;
    }

    // Ohne Yield dazwischen: alle drei liegen in der Queue bevor der Write-Pump laeuft
    hub.an_user_senden(&u1, NachrichtenTyp::TaskCreated, Default::default());
    hub.an_user_senden(&u1, NachrichtenTyp::TaskUpdated, Default::default());
    hub.an_user_senden(&u1, NachrichtenTyp::TaskDeleted, Default::default());

    let frame = timeout(WARTEZEIT, client.ausgang.recv()).await.unwrap().unwrap();
    let Message::Text(text) = frame else {
        panic!("Text-Frame erwartet");
    };
    let typen: Vec<_> = stapel_zerlegen(&text)
        .map(|zeile| Envelope::from_json(zeile).unwrap().typ)
        .collect();
    assert_eq!(
        typen,
        vec![
            NachrichtenTyp::TaskCreated,
            NachrichtenTyp::TaskUpdated,
            NachrichtenTyp::TaskDeleted
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn lese_deadline_trennt_stille_verbindung() {
    let hub = Hub::neu(RealtimeConfig::default());
    let client = verbinden(&hub, "u1");

    // Eingang bleibt offen, es kommt nur nichts: nach 54 s Protokoll-Ping,
    // nach 60 s Deadline
    let rest = client.auslaufen(Duration::from_secs(120)).await;

    assert_eq!(hub.verbindungs_anzahl(), 0);
    assert!(matches!(rest.first(), Some(Message::Ping(_))));
    assert!(matches!(rest.last(), Some(Message::Close(_))));
}

#[tokio::test(start_paused = true)]
async fn pong_verlaengert_lese_deadline() {
    let hub = Hub::neu(RealtimeConfig::default());
    let mut client = verbinden(&hub, "u1");
    client.bereit().await;

    let id = hub.verbindungen_von(&UserId::from("u1"))[0];
    let handle = hub.verbindung(&id).unwrap();
    let vorher = handle.letzte_aktivitaet();

    tokio::time::advance(Duration::from_secs(40)).await;
    client.senden(Aktion::Pong, None).await;
    timeout(WARTEZEIT, async {
        while handle.letzte_aktivitaet() == vorher {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("Pong wurde nicht als Aktivitaet gezaehlt");

    assert!(handle.letzte_aktivitaet() >= vorher + Duration::from_secs(40));
    assert!(handle.inaktiv_seit() < Duration::from_secs(1));

    // 80 s nach der Registrierung, aber erst 40 s nach dem Pong
    tokio::time::advance(Duration::from_secs(40)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!handle.ist_getrennt());
    assert_eq!(hub.verbindungs_anzahl(), 1);

    let rest = client.auslaufen(Duration::from_secs(120)).await;
    assert!(handle.ist_getrennt());
    assert!(matches!(rest.last(), Some(Message::Close(_))));
}

#[tokio::test]
async fn zu_grosser_frame_trennt() {
    let hub = Hub::neu(RealtimeConfig {
        max_frame_groesse: 1024,
        ..Default::default()
    });
    let mut client = verbinden(&hub, "u1");
    client.bereit().await;

    client.text_senden("x".repeat(2048)).await;
    let rest = client.auslaufen(WARTEZEIT).await;

    assert_eq!(hub.verbindungs_anzahl(), 0);
    assert!(matches!(rest.last(), Some(Message::Close(_))));
}

#[tokio::test]
async fn hub_trennt_mit_close_frame() {
    let hub = Hub::neu(RealtimeConfig::default());
    let mut client = verbinden(&hub, "u1");
    client.bereit().await;

    assert_eq!(hub.alle_trennen(), 1);
    let rest = client.auslaufen(WARTEZEIT).await;

    assert!(matches!(rest.last(), Some(Message::Close(_))));
    assert!(!hub.ist_online(&UserId::from("u1")));
}
