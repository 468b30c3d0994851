use super::*;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use cronhook_config::DispatcherConfig;
use std::collections::HashMap;

use cronhook_core::{CoreError, Event, JobId, MemoryStore, NewJob};
use parking_lot::Mutex;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Memory store that also logs every state written, in order.
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    transitions: Mutex<Vec<(EventId, EventState)>>,
    owners: Mutex<HashMap<EventId, JobId>>,
    fail_create_event: bool,
    /// Cancelled once the `running` write has lingered long enough for the
    /// dispatch to finish.
    cancel_after_running: Option<CancellationToken>,
}

impl RecordingStore {
    fn states_of(&self, event_id: EventId) -> Vec<EventState> {
        self.transitions
            .lock()
            .iter()
            .filter(|(id, _)| *id == event_id)
            .map(|(_, state)| *state)
            .collect()
    }
}

#[async_trait]
impl EventRecorder for RecordingStore {
    async fn create_event(&self, event: &NewEvent) -> Result<EventId, CoreError> {
        if self.fail_create_event {
            return Err(CoreError::Persistence("disk full".to_string()));
        }
        let id = self.inner.create_event(event).await?;
        self.owners.lock().insert(id, event.job_id);
        self.transitions.lock().push((id, event.state));
        Ok(id)
    }

    async fn update_event(&self, id: EventId, update: EventUpdate) -> Result<(), CoreError> {
        let state = update.state;
        self.transitions.lock().push((id, state));
        self.inner.update_event(id, update).await?;

        if let (EventState::Running, Some(cancel)) = (state, &self.cancel_after_running) {
            tokio::time::sleep(Duration::from_millis(500)).await;
            cancel.cancel();
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn create_job(&self, job: NewJob) -> Result<JobDefinition, CoreError> {
        self.inner.create_job(job).await
    }

    async fn get_job(&self, id: JobId) -> Result<Option<JobDefinition>, CoreError> {
        self.inner.get_job(id).await
    }

    async fn list_jobs(&self) -> Result<Vec<JobDefinition>, CoreError> {
        self.inner.list_jobs().await
    }

    async fn delete_job(&self, id: JobId) -> Result<bool, CoreError> {
        self.inner.delete_job(id).await
    }

    async fn update_last_run(&self, id: JobId, at: DateTime<Utc>) -> Result<(), CoreError> {
        self.inner.update_last_run(id, at).await
    }

    async fn list_events(&self, job_id: JobId) -> Result<Vec<Event>, CoreError> {
        self.inner.list_events(job_id).await
    }
}

fn runner(store: Arc<RecordingStore>) -> JobRunner {
    let dispatcher = WebhookDispatcher::new(&DispatcherConfig::default()).unwrap();
    JobRunner::new(store, Arc::new(dispatcher))
}

async fn stored_job(store: &RecordingStore, job: NewJob) -> Arc<JobDefinition> {
    Arc::new(store.create_job(job).await.unwrap())
}

async fn event(store: &RecordingStore, event_id: EventId) -> Event {
    let job_id = store.owners.lock()[&event_id];
    store
        .inner
        .list_events(job_id)
        .await
        .unwrap()
        .into_iter()
        .find(|event| event.id == event_id)
        .unwrap()
}

#[tokio::test]
async fn test_fire_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(RecordingStore::default());
    let job = stored_job(&store, NewJob::new("ok", server.uri(), "* * * * * *")).await;

    let firing = runner(store.clone())
        .fire(job.clone(), CancellationToken::new(), &InFlight::new())
        .await
        .unwrap();

    assert_eq!(firing.state, EventState::Success);
    assert_eq!(
        store.states_of(firing.event_id),
        vec![EventState::Created, EventState::Running, EventState::Success]
    );

    let recorded = event(&store, firing.event_id).await;
    assert_eq!(recorded.state, EventState::Success);
    assert_eq!(recorded.response_snapshot().unwrap().status_code, 200);
    assert!(recorded.error.is_none());

    let job = store.get_job(job.id).await.unwrap().unwrap();
    assert!(job.last_run_at.is_some());
}

#[tokio::test]
async fn test_fire_server_error_is_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = Arc::new(RecordingStore::default());
    let job = stored_job(&store, NewJob::new("err", server.uri(), "* * * * * *")).await;

    let firing = runner(store.clone())
        .fire(job.clone(), CancellationToken::new(), &InFlight::new())
        .await
        .unwrap();

    assert_eq!(firing.state, EventState::Failed);
    let recorded = event(&store, firing.event_id).await;
    assert_eq!(recorded.response_snapshot().unwrap().status_code, 500);
    assert!(recorded.error.unwrap().contains("500"));

    // The endpoint answered, so the job still counts as run.
    let job = store.get_job(job.id).await.unwrap().unwrap();
    assert!(job.last_run_at.is_some());
}

#[tokio::test]
async fn test_fire_malformed_headers_never_contacts_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(RecordingStore::default());
    let mut job = store
        .create_job(NewJob::new("bad headers", server.uri(), "* * * * * *"))
        .await
        .unwrap();
    job.headers = "{\"X-Broken\": ".to_string();

    let firing = runner(store.clone())
        .fire(Arc::new(job), CancellationToken::new(), &InFlight::new())
        .await
        .unwrap();

    assert_eq!(firing.state, EventState::Failed);
    let recorded = event(&store, firing.event_id).await;
    assert!(recorded.error.unwrap().starts_with("Error parsing headers"));
    assert!(recorded.response.is_none());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fire_connection_refused_is_failed() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = Arc::new(RecordingStore::default());
    let job = stored_job(
        &store,
        NewJob::new("down", format!("http://{addr}/"), "* * * * * *"),
    )
    .await;

    let firing = runner(store.clone())
        .fire(job.clone(), CancellationToken::new(), &InFlight::new())
        .await
        .unwrap();

    assert_eq!(firing.state, EventState::Failed);
    let recorded = event(&store, firing.event_id).await;
    assert!(recorded.error.unwrap().starts_with("Error executing request"));

    let job = store.get_job(job.id).await.unwrap().unwrap();
    assert!(job.last_run_at.is_none());
}

#[tokio::test]
async fn test_fire_cancel_in_flight() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let store = Arc::new(RecordingStore::default());
    let job = stored_job(&store, NewJob::new("slow", server.uri(), "* * * * * *")).await;
    let cancel = CancellationToken::new();
    let in_flight = InFlight::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let firing = tokio::time::timeout(
        Duration::from_secs(5),
        runner(store.clone()).fire(job, cancel, &in_flight),
    )
    .await
    .expect("Cancellation should end the firing promptly")
    .unwrap();

    assert_eq!(firing.state, EventState::Canceled);
    assert_eq!(
        store.states_of(firing.event_id),
        vec![EventState::Created, EventState::Running, EventState::Canceled]
    );
    assert_eq!(
        event(&store, firing.event_id).await.error.as_deref(),
        Some(STOPPED_MESSAGE)
    );
    assert!(!in_flight.is_busy());
}

#[tokio::test]
async fn test_fire_with_cancelled_scope_records_canceled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = Arc::new(RecordingStore::default());
    let job = stored_job(&store, NewJob::new("stopped", server.uri(), "* * * * * *")).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let firing = runner(store.clone())
        .fire(job.clone(), cancel, &InFlight::new())
        .await
        .unwrap();

    assert_eq!(firing.state, EventState::Canceled);
    assert_eq!(
        event(&store, firing.event_id).await.error.as_deref(),
        Some(STOPPED_MESSAGE)
    );
    let job = store.get_job(job.id).await.unwrap().unwrap();
    assert!(job.last_run_at.is_none());
}

#[tokio::test]
async fn test_cancel_wins_over_finished_dispatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let store = Arc::new(RecordingStore {
        cancel_after_running: Some(cancel.clone()),
        ..Default::default()
    });
    let job = stored_job(&store, NewJob::new("tie", server.uri(), "* * * * * *")).await;

    let firing = runner(store.clone())
        .fire(job.clone(), cancel, &InFlight::new())
        .await
        .unwrap();

    // The endpoint answered, but the scope was already cancelled when the
    // outcome was read.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(firing.state, EventState::Canceled);
    assert_eq!(
        store.states_of(firing.event_id),
        vec![EventState::Created, EventState::Running, EventState::Canceled]
    );
    let recorded = event(&store, firing.event_id).await;
    assert_eq!(recorded.error.as_deref(), Some(STOPPED_MESSAGE));
    assert!(recorded.response.is_none());

    let job = store.get_job(job.id).await.unwrap().unwrap();
    assert!(job.last_run_at.is_none());
}

#[tokio::test]
async fn test_fire_skips_while_previous_running() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(1)))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(RecordingStore::default());
    let job = stored_job(&store, NewJob::new("overlap", server.uri(), "* * * * * *")).await;
    let runner = Arc::new(runner(store.clone()));
    let in_flight = InFlight::new();
    let cancel = CancellationToken::new();

    let first = {
        let runner = runner.clone();
        let job = job.clone();
        let cancel = cancel.clone();
        let in_flight = in_flight.clone();
        tokio::spawn(async move { runner.fire(job, cancel, &in_flight).await })
    };

    while !in_flight.is_busy() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let second = runner.fire(job.clone(), cancel, &in_flight).await.unwrap();
    assert_eq!(second.state, EventState::Canceled);
    assert_eq!(
        store.states_of(second.event_id),
        vec![EventState::Created, EventState::Pending, EventState::Canceled]
    );
    assert_eq!(
        event(&store, second.event_id).await.error.as_deref(),
        Some(SKIPPED_MESSAGE)
    );

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.state, EventState::Success);
    assert!(!in_flight.is_busy());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_fire_without_event_record_dispatches_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(RecordingStore {
        fail_create_event: true,
        ..Default::default()
    });
    let job = stored_job(&store, NewJob::new("no audit", server.uri(), "* * * * * *")).await;
    let in_flight = InFlight::new();

    let firing = runner(store.clone())
        .fire(job, CancellationToken::new(), &in_flight)
        .await;

    assert!(firing.is_none());
    assert!(!in_flight.is_busy());
}

#[test]
fn test_in_flight_guard_releases_on_drop() {
    let in_flight = InFlight::new();
    let guard = in_flight.try_acquire().unwrap();
    assert!(in_flight.is_busy());
    assert!(in_flight.try_acquire().is_none());

    drop(guard);
    assert!(!in_flight.is_busy());
    assert!(in_flight.try_acquire().is_some());
}
