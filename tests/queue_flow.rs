use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rhea::{
    audio::{
        EngineEvent, EventRouter, LoopType, Notifier, PlaybackEngine, PlaybackStatus, QueueController,
        ResolvedTracks, SessionRegistry, Track, TrackEndReason, TrackInfo, VoiceConnection, VoiceConnector,
    },
    error::MusicError,
};
use serenity::model::id::{ChannelId, GuildId};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::oneshot, time::timeout};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Play(GuildId, Track),
    Stop(GuildId),
    Destroy(GuildId),
    Leave(GuildId),
    Notify(ChannelId, String),
}

/// Retiene el siguiente `play` de un guild hasta que el test lo suelte.
struct Gate {
    entered: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// Engine, voice connector and notifier that only record what they were asked.
#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<Call>>,
    gates: Mutex<HashMap<GuildId, Gate>>,
}

impl Recorder {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn played(&self, guild_id: GuildId) -> Vec<Track> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Play(g, track) if g == guild_id => Some(track),
                _ => None,
            })
            .collect()
    }

    fn plays(&self, guild_id: GuildId) -> Vec<String> {
        self.played(guild_id)
            .iter()
            .map(|track| track.title().to_string())
            .collect()
    }

    /// Devuelve (aviso de que el `play` llegó al nodo, llave para soltarlo).
    fn hold_next_play(&self, guild_id: GuildId) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.gates.lock().insert(
            guild_id,
            Gate {
                entered: entered_tx,
                release: release_rx,
            },
        );
        (entered_rx, release_tx)
    }
}

#[async_trait]
impl PlaybackEngine for Recorder {
    async fn resolve(&self, query: &str) -> Result<ResolvedTracks, MusicError> {
        Err(MusicError::TrackResolutionFailed(query.to_string()))
    }

    async fn connect_voice(&self, _: GuildId, _: &VoiceConnection) -> Result<(), MusicError> {
        Ok(())
    }

    async fn play(&self, guild_id: GuildId, track: &Track) -> Result<(), MusicError> {
        let gate = self.gates.lock().remove(&guild_id);
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.release.await;
        }
        self.calls.lock().push(Call::Play(guild_id, track.clone()));
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.calls.lock().push(Call::Stop(guild_id));
        Ok(())
    }

    async fn set_paused(&self, _: GuildId, _: bool) -> Result<(), MusicError> {
        Ok(())
    }

    async fn destroy(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.calls.lock().push(Call::Destroy(guild_id));
        Ok(())
    }

    async fn reconnect(&self) -> Result<bool, MusicError> {
        Ok(true)
    }
}

#[async_trait]
impl VoiceConnector for Recorder {
    async fn join(&self, _: GuildId, channel_id: ChannelId) -> Result<VoiceConnection, MusicError> {
        Ok(VoiceConnection {
            channel_id,
            endpoint: "voice.discord.media".to_string(),
            session_id: "voice-session".to_string(),
            token: "voice-token".to_string(),
        })
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.calls.lock().push(Call::Leave(guild_id));
        Ok(())
    }
}

#[async_trait]
impl Notifier for Recorder {
    async fn notify(&self, channel_id: ChannelId, message: &str) -> Result<(), MusicError> {
        self.calls.lock().push(Call::Notify(channel_id, message.to_string()));
        Ok(())
    }
}

fn track(id: &str) -> Track {
    Track::new(
        format!("encoded-{id}"),
        TrackInfo {
            identifier: id.to_string(),
            title: id.to_string(),
            author: "Artist".to_string(),
            uri: None,
            length: Duration::from_secs(200),
            is_stream: false,
            is_seekable: true,
            source_name: "http".to_string(),
            artwork_url: None,
        },
    )
}

struct Harness {
    recorder: Arc<Recorder>,
    registry: Arc<SessionRegistry>,
    controller: QueueController,
    router: EventRouter,
}

impl Harness {
    async fn new(guilds: &[GuildId]) -> Self {
        let recorder = Arc::new(Recorder::default());
        let registry = Arc::new(SessionRegistry::new(
            recorder.clone(),
            recorder.clone(),
            recorder.clone(),
        ));
        for guild in guilds {
            registry
                .get_or_create(*guild, ChannelId::new(100), Some(ChannelId::new(200)))
                .await
                .unwrap();
        }
        Self {
            controller: QueueController::new(registry.clone()),
            router: EventRouter::new(registry.clone()),
            recorder,
            registry,
        }
    }

    async fn route_and_settle(&self, event: EngineEvent) {
        let guild_id = match &event {
            EngineEvent::TrackEnded { guild_id, .. }
            | EngineEvent::TrackException { guild_id, .. }
            | EngineEvent::TrackStuck { guild_id, .. } => *guild_id,
            _ => unreachable!("only track events are routed here"),
        };
        self.router.route(event);
        self.registry.settle(guild_id).await;
    }

    async fn finish(&self, guild_id: GuildId, track: &Track) {
        self.router.route(EngineEvent::TrackEnded {
            guild_id,
            track: track.clone(),
            reason: TrackEndReason::Finished,
        });
        self.registry.settle(guild_id).await;
    }
}

const GUILD: GuildId = GuildId::new(1);

#[tokio::test]
async fn track_end_without_loop_advances_to_next() {
    let h = Harness::new(&[GUILD]).await;
    let (a, b) = (track("a"), track("b"));
    h.controller
        .play(GUILD, ResolvedTracks::playlist("Mix", vec![a.clone(), b.clone()]))
        .await
        .unwrap();

    h.finish(GUILD, &a).await;

    let snapshot = h.controller.snapshot(GUILD).await.unwrap();
    assert_eq!(snapshot.current, Some(b));
    assert!(snapshot.queue.is_empty());
    assert_eq!(h.recorder.plays(GUILD), ["a", "b"]);
}

#[tokio::test]
async fn queue_loop_with_single_track_replays_it() {
    let h = Harness::new(&[GUILD]).await;
    let a = track("a");
    h.controller.play(GUILD, ResolvedTracks::single(a.clone())).await.unwrap();
    h.controller.set_loop(GUILD, Some(LoopType::Queue)).await.unwrap();

    h.finish(GUILD, &a).await;

    let snapshot = h.controller.snapshot(GUILD).await.unwrap();
    assert_eq!(snapshot.current, Some(a));
    assert!(snapshot.queue.is_empty());
    assert_eq!(h.recorder.plays(GUILD), ["a", "a"]);
}

#[tokio::test]
async fn single_loop_repeats_until_skipped() {
    let h = Harness::new(&[GUILD]).await;
    let (a, b) = (track("a"), track("b"));
    h.controller
        .play(GUILD, ResolvedTracks::playlist("Mix", vec![a.clone(), b.clone()]))
        .await
        .unwrap();
    h.controller.set_loop(GUILD, Some(LoopType::Single)).await.unwrap();

    h.finish(GUILD, &a).await;
    h.finish(GUILD, &a).await;
    assert_eq!(h.controller.snapshot(GUILD).await.unwrap().queue, vec![b.clone()]);

    let outcome = h.controller.skip(GUILD).await.unwrap();
    assert_eq!(outcome.current, Some(b));
    assert_eq!(outcome.queue_len, 0);

    // El eco del reemplazo no debe avanzar la cola otra vez
    h.router.route(EngineEvent::TrackEnded {
        guild_id: GUILD,
        track: a.clone(),
        reason: TrackEndReason::Replaced,
    });
    h.registry.settle(GUILD).await;
    assert_eq!(h.recorder.plays(GUILD), ["a", "a", "a", "b"]);
}

#[tokio::test]
async fn drained_queue_goes_idle_and_enqueue_does_not_restart() {
    let h = Harness::new(&[GUILD]).await;
    let a = track("a");
    h.controller.play(GUILD, ResolvedTracks::single(a.clone())).await.unwrap();

    h.finish(GUILD, &a).await;
    let snapshot = h.controller.snapshot(GUILD).await.unwrap();
    assert_eq!(snapshot.status, PlaybackStatus::Idle);
    assert_eq!(snapshot.current, None);

    let outcome = h.controller.enqueue(GUILD, vec![track("b")]).await.unwrap();
    assert_eq!(outcome.status, PlaybackStatus::Idle);
    assert_eq!(h.recorder.plays(GUILD), ["a"]);
}

#[tokio::test]
async fn stuck_track_skips_and_posts_notice() {
    let h = Harness::new(&[GUILD]).await;
    let (a, b) = (track("a"), track("b"));
    h.controller
        .play(GUILD, ResolvedTracks::playlist("Mix", vec![a.clone(), b.clone()]))
        .await
        .unwrap();
    h.controller.set_loop(GUILD, Some(LoopType::Single)).await.unwrap();

    h.router.route(EngineEvent::TrackStuck {
        guild_id: GUILD,
        track: a,
        threshold: Duration::from_secs(10),
    });
    h.registry.settle(GUILD).await;

    assert_eq!(h.controller.snapshot(GUILD).await.unwrap().current, Some(b));
    assert!(h
        .recorder
        .calls()
        .iter()
        .any(|call| matches!(call, Call::Notify(channel, _) if *channel == ChannelId::new(200))));
}

#[tokio::test]
async fn guilds_are_driven_independently() {
    let other = GuildId::new(2);
    let h = Harness::new(&[GUILD, other]).await;
    let (a, b, x, y) = (track("a"), track("b"), track("x"), track("y"));
    h.controller
        .play(GUILD, ResolvedTracks::playlist("One", vec![a.clone(), b.clone()]))
        .await
        .unwrap();
    h.controller
        .play(other, ResolvedTracks::playlist("Two", vec![x.clone(), y.clone()]))
        .await
        .unwrap();
    h.controller.set_loop(other, Some(LoopType::Single)).await.unwrap();

    h.router.route(EngineEvent::TrackEnded {
        guild_id: GUILD,
        track: a,
        reason: TrackEndReason::Finished,
    });
    h.router.route(EngineEvent::TrackEnded {
        guild_id: other,
        track: x.clone(),
        reason: TrackEndReason::Finished,
    });
    h.registry.settle(GUILD).await;
    h.registry.settle(other).await;

    assert_eq!(h.controller.snapshot(GUILD).await.unwrap().current, Some(b));
    let other_snapshot = h.controller.snapshot(other).await.unwrap();
    assert_eq!(other_snapshot.current, Some(x));
    assert_eq!(other_snapshot.queue, vec![y]);
}

#[tokio::test]
async fn leaving_discards_the_session() {
    let h = Harness::new(&[GUILD]).await;
    h.controller
        .play(GUILD, ResolvedTracks::playlist("Mix", vec![track("a"), track("b")]))
        .await
        .unwrap();

    assert!(h.registry.remove(GUILD).await);

    assert!(matches!(
        h.controller.skip(GUILD).await,
        Err(MusicError::NoActiveSession)
    ));
    let calls = h.recorder.calls();
    assert!(calls.contains(&Call::Destroy(GUILD)));
    assert!(calls.contains(&Call::Leave(GUILD)));
}

#[tokio::test]
async fn late_load_failed_for_failed_copy_keeps_the_duplicate_playing() {
    let h = Harness::new(&[GUILD]).await;
    let a = track("a");
    h.controller
        .play(GUILD, ResolvedTracks::playlist("Twice", vec![a.clone(), a.clone()]))
        .await
        .unwrap();
    let first = h.recorder.played(GUILD)[0].clone();

    h.route_and_settle(EngineEvent::TrackException {
        guild_id: GUILD,
        track: first.clone(),
        message: "Video unavailable".to_string(),
    })
    .await;
    // El nodo cierra la copia fallida después de que ya empezó la segunda
    h.route_and_settle(EngineEvent::TrackEnded {
        guild_id: GUILD,
        track: first,
        reason: TrackEndReason::LoadFailed,
    })
    .await;

    let second = h.recorder.played(GUILD)[1].clone();
    let snapshot = h.controller.snapshot(GUILD).await.unwrap();
    assert_eq!(snapshot.status, PlaybackStatus::Playing);
    assert_eq!(snapshot.current.as_ref().and_then(Track::play_id), second.play_id());
    assert_eq!(h.recorder.plays(GUILD), ["a", "a"]);

    // El final real de la segunda copia sí se respeta
    h.route_and_settle(EngineEvent::TrackEnded {
        guild_id: GUILD,
        track: second,
        reason: TrackEndReason::Finished,
    })
    .await;
    assert_eq!(h.controller.snapshot(GUILD).await.unwrap().status, PlaybackStatus::Idle);
}

#[tokio::test]
async fn busy_guild_does_not_hold_back_events_of_another() {
    let other = GuildId::new(2);
    let h = Harness::new(&[GUILD, other]).await;
    let (x, y) = (track("x"), track("y"));
    h.controller
        .play(other, ResolvedTracks::playlist("Two", vec![x.clone(), y.clone()]))
        .await
        .unwrap();

    // GUILD queda con el lock tomado mientras el nodo no responde
    let (entered, release) = h.recorder.hold_next_play(GUILD);
    let controller = h.controller.clone();
    let pending = tokio::spawn(async move { controller.play(GUILD, ResolvedTracks::single(track("a"))).await });
    entered.await.unwrap();

    h.router.route(EngineEvent::TrackEnded {
        guild_id: other,
        track: x,
        reason: TrackEndReason::Finished,
    });
    timeout(Duration::from_secs(1), h.registry.settle(other))
        .await
        .expect("events of the other guild must not wait for GUILD");
    let snapshot = timeout(Duration::from_secs(1), h.controller.snapshot(other))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.current, Some(y));
    assert!(!pending.is_finished());

    release.send(()).unwrap();
    let outcome = pending.await.unwrap().unwrap();
    assert!(outcome.started);
    assert_eq!(h.recorder.plays(GUILD), ["a"]);
}

#[tokio::test]
async fn remove_waits_for_in_flight_play_then_rejects_commands() {
    let h = Harness::new(&[GUILD]).await;
    let session = h.registry.get(GUILD).unwrap();

    let (entered, release) = h.recorder.hold_next_play(GUILD);
    let controller = h.controller.clone();
    let pending = tokio::spawn(async move {
        controller
            .play(GUILD, ResolvedTracks::playlist("Mix", vec![track("a"), track("b")]))
            .await
    });
    entered.await.unwrap();

    let registry = h.registry.clone();
    let removal = tokio::spawn(async move { registry.remove(GUILD).await });
    // La sesión sale del mapa enseguida, pero el cierre espera el lock
    while h.registry.contains(GUILD) {
        tokio::task::yield_now().await;
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!removal.is_finished());
    assert!(!h.recorder.calls().contains(&Call::Destroy(GUILD)));

    release.send(()).unwrap();
    let outcome = pending.await.unwrap().unwrap();
    assert!(outcome.started);
    assert_eq!(outcome.state.queue_len, 1);
    assert!(removal.await.unwrap());

    // El play se aplicó completo antes de destruir el reproductor
    let calls = h.recorder.calls();
    let play_at = calls.iter().position(|c| matches!(c, Call::Play(..))).unwrap();
    let destroy_at = calls.iter().position(|c| *c == Call::Destroy(GUILD)).unwrap();
    assert!(play_at < destroy_at);

    let s = session.lock().await;
    assert!(s.is_closed());
    assert!(s.queue().is_empty());
    drop(s);
    assert!(matches!(
        h.controller.skip(GUILD).await,
        Err(MusicError::NoActiveSession)
    ));
}
