mod collaborators;
mod config;

use automations::server::Server;
use clap::Parser;
use deploy::{DeployExecutor, EnvironmentRegistry, Verb};
use router::{AppState, JobQueues};
use std::sync::Arc;

/// The Universal Control Plane: front-door router (C3), AWS adapter (C4),
/// and async deployment processor (C5) in one process.
#[derive(Debug, Parser)]
#[command(about, version)]
struct Args {
    /// Path to the bootstrap YAML config (listen address, planes,
    /// environments, and external collaborator URLs).
    #[arg(long, env = "UCP_CONFIG")]
    config: std::path::PathBuf,

    /// Deployment-processor concurrency per verb.
    #[arg(long, env = "UCP_DEPLOY_PERMITS", default_value_t = 8)]
    deploy_permits: usize,
}

fn install_tracing() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_tracing();

    let args = Args::parse();
    let cfg = config::load(&args.config)?;

    let aws_config = aws_config::load_from_env().await;
    let cloud_control: Arc<dyn aws_adapter::client::CloudControlClient> = Arc::new(
        aws_adapter::client::SdkCloudControlClient::new(aws_sdk_cloudcontrol::Client::new(&aws_config)),
    );

    let http_client = reqwest::Client::new();
    let store: Arc<dyn store::Store> = Arc::new(store::memory::InMemoryStore::new());
    let planes = Arc::new(planes::PlaneRegistry::from_config(cfg.planes));
    let environments = Arc::new(EnvironmentRegistry::from_list(cfg.environments));

    let job_queues = Arc::new(JobQueues {
        put: Arc::new(automations::queue::MemoryQueue::new()),
        patch: Arc::new(automations::queue::MemoryQueue::new()),
        delete: Arc::new(automations::queue::MemoryQueue::new()),
    });
    let aws_status_queue: Arc<dyn automations::queue::JobQueue> =
        Arc::new(automations::queue::MemoryQueue::new());

    let state = Arc::new(AppState {
        planes: planes.clone(),
        store: store.clone(),
        http_client,
        cloud_control: cloud_control.clone(),
        aws_schemas: aws_adapter::default_schemas(),
        portable_types: Arc::new(router::portable_types::PortableTypeRegistry::new()),
        job_queues: job_queues.clone(),
        aws_status_queue: aws_status_queue.clone(),
    });

    let app = router::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(cfg.listen_addr).await?;
    tracing::info!(addr = %cfg.listen_addr, "ucp listening");

    let oci: Arc<dyn deploy::recipe::OciRegistryClient> = Arc::new(collaborators::HttpOciRegistryClient::new(
        reqwest::Client::new(),
        cfg.oci_registry_url,
    ));
    let deployment_engine: Arc<dyn deploy::recipe::DeploymentEngine> = Arc::new(
        collaborators::HttpDeploymentEngine::new(reqwest::Client::new(), cfg.deployment_engine_url),
    );
    let secrets: Arc<dyn deploy::recipe::SecretStore> = Arc::new(collaborators::EnvSecretStore::new(
        ["aws-credentials".to_string(), "azure-credentials".to_string()],
    ));

    let renderers = Arc::new(deploy::render::RendererRegistry::new());
    let handlers = Arc::new(deploy::apply::HandlerRegistry::new());
    let transformers = Arc::new(deploy::secret::TransformerRegistry::new());

    let lookup_environments = {
        let environments = environments.clone();
        Arc::new(move |name: &str| environments.lookup(name)) as Arc<dyn Fn(&str) -> Option<deploy::environment::Environment> + Send + Sync>
    };

    let mut deploy_servers = Vec::new();
    for (verb, queue) in [
        (Verb::Put, job_queues.put.clone()),
        (Verb::Patch, job_queues.patch.clone()),
        (Verb::Delete, job_queues.delete.clone()),
    ] {
        let executor = DeployExecutor {
            verb,
            store: store.clone(),
            environments: lookup_environments.clone(),
            renderers: renderers.clone(),
            handlers: handlers.clone(),
            oci: oci.clone(),
            deployment_engine: deployment_engine.clone(),
            secrets: secrets.clone(),
            transformers: transformers.clone(),
        };
        deploy_servers.push(tokio::spawn(Server::new(executor, queue).serve(
            args.deploy_permits,
            std::time::Duration::from_millis(500),
            std::time::Duration::from_secs(30),
            shutdown_signal(),
        )));
    }

    let aws_status_executor = aws_adapter::status::StatusExecutor {
        client: cloud_control.clone(),
        store: store.clone(),
    };
    deploy_servers.push(tokio::spawn(
        Server::new(aws_status_executor, aws_status_queue.clone()).serve(
            args.deploy_permits,
            std::time::Duration::from_millis(500),
            std::time::Duration::from_secs(30),
            shutdown_signal(),
        ),
    ));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for handle in deploy_servers {
        let _ = handle.await;
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
