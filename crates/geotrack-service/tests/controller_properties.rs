//! Property tests: controller invariants hold after any sequence of actions,
//! source events and host restarts.

use std::sync::Arc;

use geotrack_core::{MockPositionSource, SourceEvent, SourceOptions};
use geotrack_service::{Controller, Flow, SessionState, ShutdownReason};
use geotrack_store::Store;
use geotrack_types::{Position, Request};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use tokio::sync::{Mutex, broadcast};

#[derive(Debug, Clone)]
enum Step {
    StartController,
    StartSession(String),
    EndSession,
    StopController,
    Unknown,
    Fix(f64, f64),
    DisableProvider,
    EnableProvider,
    SetPermission(bool),
    HostRestart,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        2 => Just(Step::StartController),
        4 => "[a-z ]{0,8}".prop_map(Step::StartSession),
        3 => Just(Step::EndSession),
        1 => Just(Step::StopController),
        1 => Just(Step::Unknown),
        6 => (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lon)| Step::Fix(lat, lon)),
        1 => Just(Step::DisableProvider),
        2 => Just(Step::EnableProvider),
        1 => any::<bool>().prop_map(Step::SetPermission),
        1 => Just(Step::HostRestart),
    ]
}

async fn boot(store: &Arc<Mutex<Store>>, source: &Arc<MockPositionSource>) -> Controller {
    let (tx, _) = broadcast::channel(16);
    let mut controller = Controller::init(
        Arc::clone(store),
        source.clone(),
        tx,
        SourceOptions::default(),
    )
    .await;
    if controller.has_snapshot() {
        let _ = controller.resume().await;
    }
    controller
}

async fn check_invariants(
    controller: &Controller,
    store: &Arc<Mutex<Store>>,
) -> Result<(), TestCaseError> {
    let store = store.lock().await;
    let open = store.open_sessions().unwrap();
    prop_assert!(open.len() <= 1, "more than one open session: {:?}", open);

    let snapshot = controller.snapshot();
    if let Some(persisted) = store.load_snapshot().unwrap() {
        prop_assert_eq!(persisted, snapshot);
    }

    let current_is_open = snapshot
        .current_session_id
        .is_some_and(|id| open.iter().any(|s| s.id == id));
    prop_assert_eq!(snapshot.operating, current_is_open);
    prop_assert_eq!(
        controller.session_state() == SessionState::SessionOpen,
        snapshot.operating
    );
    Ok(())
}

async fn run(steps: Vec<Step>) -> Result<(), TestCaseError> {
    let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
    let source = Arc::new(MockPositionSource::new());
    let mut controller = boot(&store, &source).await;
    let mut expected_samples = 0u64;

    for step in steps {
        let flow = match step {
            Step::StartController => controller.handle(Request::StartController).await,
            Step::StartSession(name) => controller.handle(Request::StartSession { name }).await,
            Step::EndSession => controller.handle(Request::EndSession).await,
            Step::StopController => controller.handle(Request::StopController).await,
            Step::Unknown => controller.handle(Request::Unknown("warp".into())).await,
            Step::Fix(latitude, longitude) => {
                let recording = controller.snapshot().current_session_id.filter(|_| {
                    controller.session_state() == SessionState::SessionOpen
                });
                let flow = controller
                    .on_source_event(SourceEvent::Fix {
                        position: Position::new(latitude, longitude),
                    })
                    .await;
                if let Some(id) = recording {
                    expected_samples += 1;
                    let in_session = store.lock().await.count_samples(Some(id)).unwrap();
                    prop_assert!(in_session >= 1);
                }
                flow
            }
            Step::DisableProvider => {
                source.set_provider_enabled(false);
                controller
                    .on_source_event(SourceEvent::ProviderDisabled)
                    .await
            }
            Step::EnableProvider => {
                source.set_provider_enabled(true);
                controller.on_source_event(SourceEvent::ProviderEnabled).await
            }
            Step::SetPermission(granted) => {
                source.set_permission_granted(granted);
                Flow::Continue
            }
            Step::HostRestart => controller.shutdown(ShutdownReason::Host).await,
        };

        check_invariants(&controller, &store).await?;

        if flow == Flow::Stop {
            // The host restarts the process
            controller = boot(&store, &source).await;
            check_invariants(&controller, &store).await?;
        }
    }

    prop_assert_eq!(
        store.lock().await.count_samples(None).unwrap(),
        expected_samples
    );
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn controller_invariants_hold(steps in prop::collection::vec(step(), 1..60)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(run(steps))?;
    }
}
