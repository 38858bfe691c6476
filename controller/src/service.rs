use std::{io::ErrorKind, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use aquatimer_common::{
    AlarmSlot, RuntimeConfig, Schedule, SchedulerEngine, Timestamp, TOPIC_CMD_MAINTENANCE,
    TOPIC_CMD_SCHEDULE_ADD, TOPIC_CMD_SCHEDULE_CLEAR, TOPIC_CMD_SCHEDULE_REMOVE, TOPIC_CMD_TIME,
    TOPIC_CMD_VACATION, TOPIC_RELAY_STATE, TOPIC_STATE,
};

use crate::rtc::SoftRtc;

type Engine = SchedulerEngine<SoftRtc>;

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    mqtt: AsyncClient,
    store: AppStore,
    utc_offset_seconds: i32,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    state_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Deserialize)]
struct TimeCommand {
    #[serde(rename = "utcEpoch")]
    utc_epoch: u32,
    #[serde(rename = "offsetSeconds", default)]
    offset_seconds: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct RemoveCommand {
    id: u8,
}

#[derive(Debug, Deserialize)]
struct VacationCommand {
    enabled: bool,
    #[serde(rename = "startEpoch", default)]
    start_epoch: Option<i64>,
    #[serde(rename = "endEpoch", default)]
    end_epoch: Option<i64>,
    #[serde(rename = "runMaintenance", default)]
    run_maintenance: bool,
}

#[derive(Debug, Deserialize)]
struct MaintenanceCommand {
    enabled: bool,
    #[serde(rename = "dayOfMonth")]
    day_of_month: u8,
    hour: u8,
    minute: u8,
    #[serde(rename = "durationSeconds")]
    duration_seconds: u16,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let engine = Arc::new(SchedulerEngine::new(SoftRtc::new(), runtime.engine.clone()));
    engine.begin().context("rtc initialization failed")?;

    match store.load_state_blob().await {
        Ok(Some(blob)) => {
            if let Err(err) = engine.deserialize_state(&blob) {
                warn!("persisted state rejected: {err}");
            }
        }
        Ok(None) => debug!("no persisted state yet"),
        Err(err) => warn!("failed to read persisted state: {err:#}"),
    }

    if let Err(err) = engine.on_schedule_event(|schedule, is_start| {
        info!(
            "schedule {} '{}' {}",
            schedule.id,
            schedule.name,
            if is_start { "started" } else { "ended" }
        );
    }) {
        warn!("schedule observer registration failed: {err}");
    }
    if let Err(err) = engine.on_time_change(|t| info!("clock changed to {t}")) {
        warn!("time observer registration failed: {err}");
    }
    if let Err(err) = engine.on_alarm(|slot| info!("alarm {slot} acknowledged")) {
        warn!("alarm observer registration failed: {err}");
    }

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.mqtt.host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.mqtt.port);

    let mut mqtt_options = MqttOptions::new("aquatimer-controller", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.mqtt.user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.mqtt.pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let app_state = AppState {
        engine,
        mqtt,
        store,
        utc_offset_seconds: runtime.utc_offset_seconds,
    };

    subscribe_topics(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_decision_loop(app_state.clone());
    spawn_state_publish_loop(app_state.clone());

    app_state.engine.log_diagnostics();
    info!("aquatimer controller started");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    persist_state(&app_state).await;
    Ok(())
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_CMD_TIME,
        TOPIC_CMD_SCHEDULE_ADD,
        TOPIC_CMD_SCHEDULE_REMOVE,
        TOPIC_CMD_SCHEDULE_CLEAR,
        TOPIC_CMD_VACATION,
        TOPIC_CMD_MAINTENANCE,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtMostOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

/// Once-a-second relay decision pass: schedule transitions, fired alarms and
/// the monthly pump exercise.
fn spawn_decision_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        let mut relay_on = false;

        loop {
            interval.tick().await;

            if let Err(err) = app_state.engine.poll_schedule_events() {
                debug!("schedule poll skipped: {err}");
            }

            match app_state.engine.within_any_schedule() {
                Ok(active) if active != relay_on => {
                    relay_on = active;
                    let payload = if relay_on { "on" } else { "off" };
                    info!("relay {payload}");
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_RELAY_STATE, QoS::AtLeastOnce, true, payload)
                        .await
                    {
                        warn!("relay state publish failed: {err}");
                    }
                }
                Ok(_) => {}
                Err(err) => debug!("relay evaluation skipped: {err}"),
            }

            match app_state.engine.alarm_fired(AlarmSlot::One) {
                Ok(true) => {
                    info!("hardware alarm 1 fired");
                    if let Err(err) = app_state.engine.acknowledge_alarm(AlarmSlot::One) {
                        warn!("alarm acknowledge failed: {err}");
                    }
                    if let Err(err) = app_state.engine.plan_next_alarm() {
                        debug!("alarm re-arm: {err}");
                    }
                }
                Ok(false) => {}
                Err(err) => debug!("alarm query skipped: {err}"),
            }

            match app_state.engine.maintenance_due() {
                Ok(true) => {
                    let duration_seconds = app_state
                        .engine
                        .maintenance()
                        .map(|m| m.duration_seconds)
                        .unwrap_or(0);
                    info!("pump exercise due, running pump for {duration_seconds}s");
                    if let Err(err) = app_state.engine.mark_maintenance_complete() {
                        warn!("pump exercise completion failed: {err}");
                    }
                    persist_state(&app_state).await;
                }
                Ok(false) => {}
                Err(err) => debug!("maintenance check skipped: {err}"),
            }
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        loop {
            interval.tick().await;

            match serde_json::to_vec(&app_state.engine.status()) {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("status publish failed: {err}");
                    }
                }
                Err(err) => warn!("status serialization failed: {err}"),
            }
        }
    });
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    match topic.as_str() {
        TOPIC_CMD_TIME => {
            let command: TimeCommand =
                serde_json::from_slice(&payload).context("time command payload")?;
            let offset = command
                .offset_seconds
                .unwrap_or(app_state.utc_offset_seconds);
            match app_state.engine.set_time_from_utc(command.utc_epoch, offset) {
                Ok(()) => info!("clock set from UTC epoch {}", command.utc_epoch),
                Err(err) => warn!("time update rejected: {err}"),
            }
        }
        TOPIC_CMD_SCHEDULE_ADD => {
            let schedule: Schedule =
                serde_json::from_slice(&payload).context("schedule payload")?;
            match app_state.engine.add_schedule(schedule) {
                Ok(id) => {
                    info!("schedule {id} accepted");
                    persist_state(app_state).await;
                }
                Err(err) => warn!("schedule rejected: {err}"),
            }
        }
        TOPIC_CMD_SCHEDULE_REMOVE => {
            let command: RemoveCommand =
                serde_json::from_slice(&payload).context("remove command payload")?;
            match app_state.engine.remove_schedule(command.id) {
                Ok(()) => persist_state(app_state).await,
                Err(err) => warn!("schedule removal rejected: {err}"),
            }
        }
        TOPIC_CMD_SCHEDULE_CLEAR => {
            match app_state.engine.clear_schedules() {
                Ok(()) => persist_state(app_state).await,
                Err(err) => warn!("schedule clear rejected: {err}"),
            }
        }
        TOPIC_CMD_VACATION => {
            let command: VacationCommand =
                serde_json::from_slice(&payload).context("vacation command payload")?;
            let start = command
                .start_epoch
                .map_or(Timestamp::INVALID, Timestamp::from_unix);
            let end = command
                .end_epoch
                .map_or(Timestamp::INVALID, Timestamp::from_unix);
            match app_state
                .engine
                .set_vacation(command.enabled, start, end, command.run_maintenance)
            {
                Ok(()) => persist_state(app_state).await,
                Err(err) => warn!("vacation update rejected: {err}"),
            }
        }
        TOPIC_CMD_MAINTENANCE => {
            let command: MaintenanceCommand =
                serde_json::from_slice(&payload).context("maintenance command payload")?;
            match app_state.engine.set_maintenance(
                command.enabled,
                command.day_of_month,
                command.hour,
                command.minute,
                command.duration_seconds,
            ) {
                Ok(()) => persist_state(app_state).await,
                Err(err) => warn!("maintenance update rejected: {err}"),
            }
        }
        other => debug!("ignoring message on unexpected topic {other}"),
    }

    Ok(())
}

async fn persist_state(app_state: &AppState) {
    match app_state.engine.serialize_state() {
        Ok(blob) => {
            if let Err(err) = app_state.store.save_state_blob(&blob).await {
                warn!("state persist failed: {err:#}");
            }
        }
        Err(err) => warn!("state serialization failed: {err}"),
    }
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("AQUATIMER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.aquatimer"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            state_path: Arc::new(data_dir.join("state.bin")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn load_state_blob(&self) -> anyhow::Result<Option<Vec<u8>>> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.state_path.as_ref()).await {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_state_blob(&self, blob: &[u8]) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.state_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, blob).await?;
        Ok(())
    }
}
