use provisioner::config::Config;
use provisioner::Controller;
use shared_data_provider::SharedDataProvisioner;
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // The provisioner cannot tell its own volumes apart without a node name, so
    // a missing one stops us here
    let config = Config::new_from_flags(env!("CARGO_PKG_VERSION"))?;

    tracing_subscriber::fmt::init();

    // Read the environment. This tries a KubeConfig file first, then falls back
    // on an in-cluster configuration.
    let kubeconfig = kube::Config::infer().await?;
    let client = kube::Client::try_from(kubeconfig)?;

    info!(
        provisioner = %config.provisioner_name,
        base_dir = %config.base_dir.display(),
        identity = %config.node_name,
        "Starting shared data provisioner."
    );
    let provisioner = SharedDataProvisioner::new(&config);
    let controller = Controller::new(client, provisioner, &config);

    tokio::select! {
        result = controller.start() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down.");
            Ok(())
        }
    }
}
