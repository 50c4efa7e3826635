//! Controller runtime tests against the full in-memory stack.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use common::{TestEnv, is_ready, spec, wait_for};
use eip_operator::gateway::Operation;
use eip_operator::{Controller, EipReconciler, EipStore, ReleaseStrategy};

const TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    env: TestEnv,
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<eip_operator::store::Result<()>>,
}

impl Running {
    fn start(env: TestEnv) -> Self {
        let reconciler = Arc::new(env.reconciler_with_store(env.store.clone()));
        let controller = Controller::new(env.store.clone(), reconciler, env.config.workers);
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(controller.run(rx));
        Self {
            env,
            shutdown,
            handle,
        }
    }

    async fn stop(self) -> TestEnv {
        self.shutdown.send(true).unwrap();
        self.handle.await.unwrap().unwrap();
        self.env
    }
}

async fn wait_ready(env: &TestEnv, name: &str) {
    wait_for(TIMEOUT, || async move {
        env.get(name).await.is_some_and(|eip| is_ready(&eip))
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_objects_present_at_startup_converge() {
    let env = TestEnv::new();
    env.create("a", spec("5")).await;
    env.create("b", spec("10")).await;

    let running = Running::start(env);
    wait_ready(&running.env, "a").await;
    wait_ready(&running.env, "b").await;
    let env = running.stop().await;

    assert_eq!(env.gateway.count(Operation::Allocate).await, 2);
    assert_eq!(env.get("b").await.unwrap().status.bandwidth, "10");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_lifecycle() {
    let running = Running::start(TestEnv::new());
    let env = &running.env;

    env.create("web", spec("5")).await;
    wait_ready(env, "web").await;
    let allocation_id = env.get("web").await.unwrap().status.allocation_id;

    env.edit("web", |s| s.bandwidth = "10".to_string()).await;
    wait_for(TIMEOUT, || async move {
        env.get("web")
            .await
            .is_some_and(|eip| eip.status.bandwidth == "10")
    })
    .await;

    env.store.delete("web").await.unwrap();
    wait_for(TIMEOUT, || async move { env.get("web").await.is_none() }).await;

    let env = running.stop().await;
    assert!(env.gateway.get(&allocation_id).await.is_none());
    assert_eq!(env.gateway.count(Operation::Allocate).await, 1);
    assert_eq!(env.gateway.count(Operation::ModifyBandwidth).await, 1);
    assert_eq!(env.gateway.count(Operation::Release).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deleting_with_never_strategy_keeps_eip() {
    let running = Running::start(TestEnv::new());
    let env = &running.env;

    env.create(
        "keep",
        eip_operator::EipSpec {
            release_strategy: ReleaseStrategy::Never,
            ..spec("5")
        },
    )
    .await;
    wait_ready(env, "keep").await;
    let allocation_id = env.get("keep").await.unwrap().status.allocation_id;

    env.store.delete("keep").await.unwrap();
    wait_for(TIMEOUT, || async move { env.get("keep").await.is_none() }).await;

    let env = running.stop().await;
    assert!(env.gateway.get(&allocation_id).await.is_some());
    assert_eq!(env.gateway.count(Operation::Release).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_cycle_is_retried_after_error_policy_delay() {
    let mut config = common::config();
    config.requeue.short_secs = 1;
    config.requeue.throttled_secs = 2;
    let env = TestEnv::with_config(config);
    env.gateway
        .fail_next(
            Operation::Allocate,
            eip_operator::GatewayError::api("ServiceUnavailable", "try again"),
        )
        .await;

    let store: Arc<dyn EipStore> = env.store.clone();
    let reconciler = Arc::new(EipReconciler::new(
        store.clone(),
        env.gateway.clone(),
        env.recorder.clone(),
        env.config.clone(),
    ));
    let controller = Controller::new(store, reconciler, 1);
    let (shutdown, rx) = watch::channel(false);
    let handle = tokio::spawn(controller.run(rx));

    env.create("web", spec("5")).await;
    wait_ready(&env, "web").await;

    shutdown.send(true).unwrap();
    handle.await.unwrap().unwrap();
    assert_eq!(env.gateway.count(Operation::Allocate).await, 2);
}
