//! Hub – zentrales Register aller Verbindungen, Raeume und User
//!
//! Der Hub weiss wer verbunden ist, welche Verbindung in welchen Raeumen ist
//! und wie jede Verbindung erreichbar ist (ihre ausgehende Queue).
//!
//! ## Nebenlaeufigkeit
//! - Alle drei Indizes (Verbindungen, Raeume, User) liegen hinter einem
//!   einzigen `RwLock` und werden immer gemeinsam veraendert
//! - Senden haelt nur den Read-Lock und reiht per `try_send` ein, es wird nie
//!   auf eine Queue gewartet und nie auf einen Socket geschrieben
//! - Ist eine Queue voll, wird die Nachricht fuer diese Verbindung verworfen
//!   und die Verbindung nach Freigabe des Locks zwangsweise abgemeldet
//!
//! ## Presence
//! Beim Uebergang 0 -> 1 Verbindungen eines Users geht genau ein
//! `user_online`, beim Uebergang 1 -> 0 genau ein `user_offline` raus.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sprintwerk_core::{Raum, UserId, VerbindungsId};
use sprintwerk_protocol::{Envelope, NachrichtenTyp, Payload};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::RealtimeConfig;
use crate::error::{RealtimeError, RealtimeResult};
use crate::presence::PresenceEvent;

// ---------------------------------------------------------------------------
// Verbindungs-Handle
// ---------------------------------------------------------------------------

/// Lebenszyklus einer Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbindungsZustand {
    /// Registriert, Raum-Mitgliedschaften duerfen sich aendern
    Verbunden,
    /// Endzustand, wird genau einmal erreicht
    Getrennt,
}

/// Geteilte Sicht auf eine registrierte Verbindung
///
/// Wird vom Hub und von den beiden Pumps der Verbindung gehalten.
#[derive(Debug)]
pub struct VerbindungsHandle {
    id: VerbindungsId,
    user_id: UserId,
    verbunden_seit: DateTime<Utc>,
    /// Monoton, Grundlage der Lese-Deadline
    letzte_aktivitaet: Mutex<Instant>,
    getrennt: AtomicBool,
}

impl VerbindungsHandle {
    fn neu(user_id: UserId) -> Self {
        Self {
            id: VerbindungsId::new(),
            user_id,
            verbunden_seit: Utc::now(),
            letzte_aktivitaet: Mutex::new(Instant::now()),
            getrennt: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> VerbindungsId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn verbunden_seit(&self) -> DateTime<Utc> {
        self.verbunden_seit
    }

    /// Merkt einen eingehenden Frame (auch Pong) als Lebenszeichen
    pub fn aktivitaet_melden(&self) {
        *self.letzte_aktivitaet.lock() = Instant::now();
    }

    /// Zeitpunkt des letzten eingehenden Frames (anfangs: Registrierung)
    pub fn letzte_aktivitaet(&self) -> Instant {
        *self.letzte_aktivitaet.lock()
    }

    pub fn inaktiv_seit(&self) -> Duration {
        self.letzte_aktivitaet().elapsed()
    }

    pub fn zustand(&self) -> VerbindungsZustand {
        if self.getrennt.load(Ordering::Acquire) {
            VerbindungsZustand::Getrennt
        } else {
            VerbindungsZustand::Verbunden
        }
    }

    pub fn ist_getrennt(&self) -> bool {
        self.zustand() == VerbindungsZustand::Getrennt
    }

    fn als_getrennt_markieren(&self) {
        self.getrennt.store(true, Ordering::Release);
    }
}

/// Ergebnis von `Hub::registrieren` – alles was die Pumps brauchen
pub struct Registrierung {
    pub handle: Arc<VerbindungsHandle>,
    /// Ausgehende Queue, wird vom Write-Pump geleert
    pub empfaenger: mpsc::Receiver<Arc<str>>,
    /// Wechselt auf `true` wenn der Hub die Verbindung abmeldet
    pub trennsignal: watch::Receiver<bool>,
}

// ---------------------------------------------------------------------------
// Statistik
// ---------------------------------------------------------------------------

/// Zaehler des Hubs, lock-frei aktualisiert
#[derive(Debug, Default)]
pub(crate) struct HubStatistik {
    zugestellt: AtomicU64,
    verworfen: AtomicU64,
    rueckstau_trennungen: AtomicU64,
    serialisierungsfehler: AtomicU64,
}

impl HubStatistik {
    pub(crate) fn serialisierungsfehler(&self) {
        self.serialisierungsfehler.fetch_add(1, Ordering::Relaxed);
    }
}

/// Momentaufnahme der Hub-Zaehler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatistikSnapshot {
    /// In eine Queue eingereihte Envelopes
    pub zugestellt: u64,
    /// Wegen voller Queue verworfene Envelopes
    pub verworfen: u64,
    /// Wegen voller Queue getrennte Verbindungen
    pub rueckstau_trennungen: u64,
    /// Nicht serialisierbare Payloads
    pub serialisierungsfehler: u64,
}

// ---------------------------------------------------------------------------
// Indizes
// ---------------------------------------------------------------------------

struct VerbindungsEintrag {
    handle: Arc<VerbindungsHandle>,
    tx: mpsc::Sender<Arc<str>>,
    trennen_tx: watch::Sender<bool>,
    raeume: HashSet<Raum>,
}

#[derive(Default)]
struct HubIndizes {
    verbindungen: HashMap<VerbindungsId, VerbindungsEintrag>,
    raeume: HashMap<Raum, HashSet<VerbindungsId>>,
    users: HashMap<UserId, HashSet<VerbindungsId>>,
}

/// Empfaengerkreis eines Sendevorgangs
enum Auswahl<'a> {
    User(&'a UserId),
    Raum {
        raum: &'a Raum,
        ausser: Option<&'a UserId>,
    },
    Alle {
        ausser: Option<&'a UserId>,
    },
    Verbindung(&'a VerbindungsId),
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// Zentrales Register und Verteiler fuer alle Verbindungen
pub struct Hub {
    indizes: RwLock<HubIndizes>,
    config: Arc<RealtimeConfig>,
    pub(crate) statistik: HubStatistik,
    presence_tx: broadcast::Sender<PresenceEvent>,
}

impl Hub {
    /// Erstellt einen neuen Hub
    pub fn neu(config: RealtimeConfig) -> Arc<Self> {
        let (presence_tx, _) = broadcast::channel(config.presence_kanal_groesse.max(1));
        Arc::new(Self {
            indizes: RwLock::new(HubIndizes::default()),
            config: Arc::new(config),
            statistik: HubStatistik::default(),
            presence_tx,
        })
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    // ---- Lebenszyklus ----

    /// Registriert eine neue Verbindung fuer einen (bereits authentifizierten) User
    ///
    /// Die Verbindung tritt automatisch ihrem persoenlichen Raum `user:<id>` bei.
    pub fn registrieren(&self, user_id: UserId) -> Registrierung {
        let (tx, empfaenger) = mpsc::channel(self.config.queue_kapazitaet.max(1));
        let (trennen_tx, trennsignal) = watch::channel(false);
        let handle = Arc::new(VerbindungsHandle::neu(user_id.clone()));
        let id = handle.id();
        let persoenlich = Raum::user(&user_id);

        let mut voll = Vec::new();
        {
            let mut guard = self.indizes.write();
            let indizes = &mut *guard;

            let mut raeume = HashSet::new();
            raeume.insert(persoenlich.clone());
            indizes.verbindungen.insert(
                id,
                VerbindungsEintrag {
                    handle: Arc::clone(&handle),
                    tx,
                    trennen_tx,
                    raeume,
                },
            );
            indizes.raeume.entry(persoenlich).or_default().insert(id);

            let tabs = indizes.users.entry(user_id.clone()).or_default();
            tabs.insert(id);
            if tabs.len() == 1 {
                self.presence_melden(
                    indizes,
                    PresenceEvent::UserOnline {
                        user_id: user_id.clone(),
                    },
                    &mut voll,
                );
            }
        }
        self.rueckstau_trennen(voll);

        tracing::info!(conn_id = %id, user_id = %user_id, "Verbindung registriert");
        Registrierung {
            handle,
            empfaenger,
            trennsignal,
        }
    }

    /// Meldet eine Verbindung ab
    ///
    /// Entfernt sie aus allen Raeumen und dem User-Index, schliesst ihre Queue
    /// und loest das Trennsignal aus. War es die letzte Verbindung des Users,
    /// geht genau ein `user_offline` raus. Gibt `false` zurueck wenn die
    /// Verbindung nicht (mehr) registriert war.
    pub fn abmelden(&self, id: &VerbindungsId) -> bool {
        let mut voll = Vec::new();
        let eintrag = {
            let mut guard = self.indizes.write();
            let indizes = &mut *guard;

            let Some(eintrag) = indizes.verbindungen.remove(id) else {
                return false;
            };

            for raum in &eintrag.raeume {
                if let Some(mitglieder) = indizes.raeume.get_mut(raum) {
                    mitglieder.remove(id);
                    if mitglieder.is_empty() {
                        indizes.raeume.remove(raum);
                    }
                }
            }

            let user_id = eintrag.handle.user_id();
            let letzte = match indizes.users.get_mut(user_id) {
                Some(tabs) => {
                    tabs.remove(id);
                    tabs.is_empty()
                }
                None => false,
            };

            eintrag.handle.als_getrennt_markieren();
            let _ = eintrag.trennen_tx.send(true);

            if letzte {
                indizes.users.remove(user_id);
                self.presence_melden(
                    indizes,
                    PresenceEvent::UserOffline {
                        user_id: user_id.clone(),
                    },
                    &mut voll,
                );
            }
            eintrag
        };

        tracing::info!(
            conn_id = %id,
            user_id = %eintrag.handle.user_id(),
            raeume = eintrag.raeume.len(),
            dauer_sek = (Utc::now() - eintrag.handle.verbunden_seit()).num_seconds(),
            "Verbindung abgemeldet"
        );
        // Sender faellt hier weg -> Write-Pump leert die Queue und schliesst
        drop(eintrag);
        self.rueckstau_trennen(voll);
        true
    }

    /// Trennt alle Verbindungen (Shutdown). Gibt die Anzahl zurueck.
    pub fn alle_trennen(&self) -> usize {
        let ids: Vec<VerbindungsId> = self.indizes.read().verbindungen.keys().copied().collect();
        let anzahl = ids.iter().filter(|id| self.abmelden(id)).count();
        tracing::info!(anzahl, "Alle Verbindungen getrennt");
        anzahl
    }

    // ---- Raeume ----

    /// Tritt einem Raum bei. `Ok(false)` wenn die Verbindung schon Mitglied war.
    pub fn raum_beitreten(&self, id: &VerbindungsId, raum: Raum) -> RealtimeResult<bool> {
        let mut guard = self.indizes.write();
        let indizes = &mut *guard;

        let eintrag = indizes
            .verbindungen
            .get_mut(id)
            .ok_or(RealtimeError::UnbekannteVerbindung(*id))?;
        if eintrag.raeume.contains(&raum) {
            return Ok(false);
        }
        let max = self.config.max_raeume_pro_verbindung;
        if eintrag.raeume.len() >= max {
            return Err(RealtimeError::ZuVieleRaeume { max });
        }

        eintrag.raeume.insert(raum.clone());
        tracing::debug!(conn_id = %id, raum = %raum, "Raum beigetreten");
        indizes.raeume.entry(raum).or_default().insert(*id);
        Ok(true)
    }

    /// Verlaesst einen Raum. `false` wenn die Verbindung nicht Mitglied war.
    pub fn raum_verlassen(&self, id: &VerbindungsId, raum: &Raum) -> bool {
        let mut guard = self.indizes.write();
        let indizes = &mut *guard;

        let Some(eintrag) = indizes.verbindungen.get_mut(id) else {
            return false;
        };
        if !eintrag.raeume.remove(raum) {
            return false;
        }
        if let Some(mitglieder) = indizes.raeume.get_mut(raum) {
            mitglieder.remove(id);
            if mitglieder.is_empty() {
                indizes.raeume.remove(raum);
            }
        }
        tracing::debug!(conn_id = %id, raum = %raum, "Raum verlassen");
        true
    }

    // ---- Senden ----

    /// Sendet an alle offenen Verbindungen eines Users
    pub fn an_user_senden(&self, user_id: &UserId, typ: NachrichtenTyp, payload: Payload) -> usize {
        self.senden(Auswahl::User(user_id), &Envelope::neu(typ, payload))
    }

    /// Sendet an alle Verbindungen im Raum, ausser denen von `ausser`
    pub fn an_raum_senden(
        &self,
        raum: &Raum,
        typ: NachrichtenTyp,
        payload: Payload,
        ausser: Option<&UserId>,
    ) -> usize {
        self.senden(Auswahl::Raum { raum, ausser }, &Envelope::neu(typ, payload))
    }

    /// Sendet an jede registrierte Verbindung
    pub fn an_alle_senden(&self, typ: NachrichtenTyp, payload: Payload) -> usize {
        self.senden(Auswahl::Alle { ausser: None }, &Envelope::neu(typ, payload))
    }

    /// Sendet ein fertiges Envelope an genau eine Verbindung (Antworten auf Steuerframes)
    pub fn an_verbindung_senden(&self, id: &VerbindungsId, envelope: &Envelope) -> bool {
        self.senden(Auswahl::Verbindung(id), envelope) > 0
    }

    /// Serialisiert einmal und reiht bei allen Empfaengern ein
    fn senden(&self, auswahl: Auswahl<'_>, envelope: &Envelope) -> usize {
        let nachricht = match envelope.serialisieren() {
            Ok(n) => n,
            Err(e) => {
                self.statistik.serialisierungsfehler();
                tracing::warn!(
                    typ = %envelope.typ,
                    fehler = %e,
                    "Envelope nicht serialisierbar – verworfen"
                );
                return 0;
            }
        };

        let mut voll = Vec::new();
        let anzahl = {
            let indizes = self.indizes.read();
            self.verteilen(&indizes, &auswahl, &nachricht, &mut voll)
        };
        tracing::trace!(typ = %envelope.typ, empfaenger = anzahl, "Envelope verteilt");

        self.rueckstau_trennen(voll);
        anzahl
    }

    fn verteilen(
        &self,
        indizes: &HubIndizes,
        auswahl: &Auswahl<'_>,
        nachricht: &Arc<str>,
        voll: &mut Vec<VerbindungsId>,
    ) -> usize {
        let mut anzahl = 0;
        let mut zustellen = |eintrag: &VerbindungsEintrag| {
            if self.einreihen(eintrag, nachricht, voll) {
                anzahl += 1;
            }
        };

        match auswahl {
            Auswahl::User(user_id) => {
                for id in indizes.users.get(*user_id).into_iter().flatten() {
                    if let Some(eintrag) = indizes.verbindungen.get(id) {
                        zustellen(eintrag);
                    }
                }
            }
            Auswahl::Raum { raum, ausser } => {
                for id in indizes.raeume.get(*raum).into_iter().flatten() {
                    if let Some(eintrag) = indizes.verbindungen.get(id) {
                        if Some(eintrag.handle.user_id()) != *ausser {
                            zustellen(eintrag);
                        }
                    }
                }
            }
            Auswahl::Alle { ausser } => {
                for eintrag in indizes.verbindungen.values() {
                    if Some(eintrag.handle.user_id()) != *ausser {
                        zustellen(eintrag);
                    }
                }
            }
            Auswahl::Verbindung(id) => {
                if let Some(eintrag) = indizes.verbindungen.get(*id) {
                    zustellen(eintrag);
                }
            }
        }
        anzahl
    }

    /// Nicht-blockierendes Einreihen in die Queue einer Verbindung
    fn einreihen(
        &self,
        eintrag: &VerbindungsEintrag,
        nachricht: &Arc<str>,
        voll: &mut Vec<VerbindungsId>,
    ) -> bool {
        match eintrag.tx.try_send(Arc::clone(nachricht)) {
            Ok(()) => {
                self.statistik.zugestellt.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.statistik.verworfen.fetch_add(1, Ordering::Relaxed);
                voll.push(eintrag.handle.id());
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(
                    conn_id = %eintrag.handle.id(),
                    "Queue geschlossen (Write-Pump beendet)"
                );
                false
            }
        }
    }

    /// Trennt Verbindungen deren Queue voll war. Nur ohne Lock aufrufen.
    fn rueckstau_trennen(&self, voll: Vec<VerbindungsId>) {
        for id in voll {
            if self.abmelden(&id) {
                self.statistik
                    .rueckstau_trennungen
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(conn_id = %id, "Send-Queue voll – Verbindung getrennt");
            }
        }
    }

    /// Presence-Uebergang an In-Process-Abonnenten und alle anderen Verbindungen
    fn presence_melden(
        &self,
        indizes: &HubIndizes,
        event: PresenceEvent,
        voll: &mut Vec<VerbindungsId>,
    ) {
        let envelope = Envelope::neu(event.nachrichten_typ(), event.payload());
        match envelope.serialisieren() {
            Ok(nachricht) => {
                let auswahl = Auswahl::Alle {
                    ausser: Some(event.user_id()),
                };
                self.verteilen(indizes, &auswahl, &nachricht, voll);
            }
            Err(e) => {
                self.statistik.serialisierungsfehler();
                tracing::warn!(fehler = %e, "Presence-Envelope nicht serialisierbar");
            }
        }
        tracing::debug!(
            user_id = %event.user_id(),
            typ = %event.nachrichten_typ(),
            "Presence geaendert"
        );
        // Kein Abonnent ist kein Fehler
        let _ = self.presence_tx.send(event);
    }

    // ---- Abfragen ----

    pub fn ist_online(&self, user_id: &UserId) -> bool {
        self.indizes.read().users.contains_key(user_id)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.indizes.read().users.keys().cloned().collect()
    }

    /// Anzahl Verbindungen im Raum (0 fuer unbekannte Raeume)
    pub fn raum_groesse(&self, raum: &Raum) -> usize {
        self.indizes.read().raeume.get(raum).map_or(0, HashSet::len)
    }

    pub fn verbindungs_anzahl(&self) -> usize {
        self.indizes.read().verbindungen.len()
    }

    /// Anzahl aktiver (nicht leerer) Raeume
    pub fn raum_anzahl(&self) -> usize {
        self.indizes.read().raeume.len()
    }

    pub fn verbindungen_von(&self, user_id: &UserId) -> Vec<VerbindungsId> {
        self.indizes
            .read()
            .users
            .get(user_id)
            .map(|tabs| tabs.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn raeume_von(&self, id: &VerbindungsId) -> Vec<Raum> {
        self.indizes
            .read()
            .verbindungen
            .get(id)
            .map(|e| e.raeume.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn ist_mitglied(&self, id: &VerbindungsId, raum: &Raum) -> bool {
        self.indizes
            .read()
            .verbindungen
            .get(id)
            .is_some_and(|e| e.raeume.contains(raum))
    }

    /// Hat mindestens eine Verbindung des Users den Raum betreten?
    pub fn user_im_raum(&self, user_id: &UserId, raum: &Raum) -> bool {
        let indizes = self.indizes.read();
        let (Some(tabs), Some(mitglieder)) = (indizes.users.get(user_id), indizes.raeume.get(raum))
        else {
            return false;
        };
        tabs.iter().any(|id| mitglieder.contains(id))
    }

    pub fn verbindung(&self, id: &VerbindungsId) -> Option<Arc<VerbindungsHandle>> {
        self.indizes
            .read()
            .verbindungen
            .get(id)
            .map(|e| Arc::clone(&e.handle))
    }

    pub fn statistik(&self) -> StatistikSnapshot {
        StatistikSnapshot {
            zugestellt: self.statistik.zugestellt.load(Ordering::Relaxed),
            verworfen: self.statistik.verworfen.load(Ordering::Relaxed),
            rueckstau_trennungen: self.statistik.rueckstau_trennungen.load(Ordering::Relaxed),
            serialisierungsfehler: self.statistik.serialisierungsfehler.load(Ordering::Relaxed),
        }
    }

    /// Abonniert Presence-Events
    pub fn events_abonnieren(&self) -> broadcast::Receiver<PresenceEvent> {
        self.presence_tx.subscribe()
    }

    // ---- Heartbeat ----

    /// Startet den periodischen `ping` an alle Verbindungen
    ///
    /// Der erste Ping geht nach einem vollen Intervall raus. Endet wenn
    /// `shutdown` auf `true` wechselt oder der Sender wegfaellt.
    pub fn heartbeat_starten(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let periode = hub.config.ping_intervall();
            let mut ticker = tokio::time::interval_at(Instant::now() + periode, periode);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let anzahl = hub.an_alle_senden(NachrichtenTyp::Ping, Payload::new());
                        tracing::trace!(empfaenger = anzahl, "Heartbeat-Ping verteilt");
                    }
                    ergebnis = shutdown.changed() => {
                        if ergebnis.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Heartbeat beendet");
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
